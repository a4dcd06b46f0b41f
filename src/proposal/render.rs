//! Text and controls shown for a proposal.
//!
//! Until a quorum of acceptors is reached only tallies are shown. After that
//! the names are listed in an order derived from the message reference, and
//! they stay listed for the rest of the proposal's life.

use crate::config::{ContentCatalog, TricksterConfig};
use crate::context::{Proposal, VoteChoice, Voter};
use crate::gateway::{Button, Controls, SendOptions};
use crate::random;
use chrono::NaiveDate;
use std::fmt::Write as _;

/// Callback data of the introduction's button.
pub const PROPOSE_ACTION: &str = "propose";

/// Whether names are (or must now become) visible.
#[must_use]
pub fn is_revealed(proposal: &Proposal, quorum: usize) -> bool {
    proposal.revealed || proposal.accept_count() >= quorum
}

/// Full message text for `proposal`.
#[must_use]
pub fn proposal_text(proposal: &Proposal, config: &TricksterConfig) -> String {
    let catalog = &config.catalog;
    let accept_count = proposal.accept_count();
    let mut lines = vec![proposal.question.clone(), String::new()];

    if is_revealed(proposal, config.quorum_size) {
        let salt = proposal.message_ref.to_string();
        lines.push(format!("{} ({accept_count}):", catalog.accepts_title));
        lines.extend(voter_lines(&proposal.accepts, proposal, &salt, config));
        if !proposal.rejects.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "{} ({}):",
                catalog.rejects_title,
                proposal.rejects.len()
            ));
            lines.extend(voter_lines(&proposal.rejects, proposal, &salt, config));
        }
    } else {
        lines.push(format!("{}: {accept_count}", catalog.accepts_title));
        lines.push(format!("{}: {}", catalog.rejects_title, proposal.rejects.len()));
    }

    lines.join("\n")
}

fn voter_lines(
    voters: &[Voter],
    proposal: &Proposal,
    salt: &str,
    config: &TricksterConfig,
) -> Vec<String> {
    let ids: Vec<i64> = voters.iter().map(|v| v.user_id).collect();
    random::shuffle(&ids, salt)
        .into_iter()
        .filter_map(|id| voters.iter().find(|v| v.user_id == id))
        .map(|voter| {
            let guest = if proposal.has_guest(voter.user_id) {
                " +1"
            } else {
                ""
            };
            let url = config
                .proposal
                .mention_url
                .replace("{id}", &voter.user_id.to_string());
            format!("• [{}{guest}]({url})", voter.display_name)
        })
        .collect()
}

/// Accept / reject on the first row, bring-a-guest on the second.
#[must_use]
pub fn voting_controls(catalog: &ContentCatalog) -> Controls {
    let button = |label: &str, choice: VoteChoice| Button {
        label: label.to_owned(),
        action: choice.callback_data().to_owned(),
    };
    Controls {
        rows: vec![
            vec![
                button(&catalog.accept, VoteChoice::Accept),
                button(&catalog.reject, VoteChoice::Reject),
            ],
            vec![button(&catalog.with_guest, VoteChoice::WithGuest)],
        ],
    }
}

/// Options for sending or editing `proposal`: controls only while open.
#[must_use]
pub fn proposal_options(proposal: &Proposal, catalog: &ContentCatalog, silent: bool) -> SendOptions {
    SendOptions {
        silent,
        markdown: true,
        controls: proposal.is_open().then(|| voting_controls(catalog)),
    }
}

/// Introduction text and its single propose button.
#[must_use]
pub fn introduction(config: &TricksterConfig, silent: bool) -> (String, SendOptions) {
    let catalog = &config.catalog;
    let text = catalog
        .introduction
        .replace("{quorum}", &config.quorum_size.to_string());
    let options = SendOptions {
        silent,
        markdown: true,
        controls: Some(Controls {
            rows: vec![vec![Button {
                label: catalog.propose_button.clone(),
                action: PROPOSE_ACTION.to_owned(),
            }]],
        }),
    };
    (text, options)
}

/// Replace every `{{FORMAT}}` with `date` rendered by the strftime `FORMAT`.
///
/// Placeholders with an invalid format are left as they are.
#[must_use]
pub fn expand_template(template: &str, date: NaiveDate) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let format = &rest[start + 2..start + 2 + len];
        out.push_str(&rest[..start]);
        let mut rendered = String::new();
        if write!(rendered, "{}", date.format(format)).is_ok() {
            out.push_str(&rendered);
        } else {
            out.push_str(&rest[start..start + 4 + len]);
        }
        rest = &rest[start + 4 + len..];
    }
    out.push_str(rest);
    out
}

/// Human-readable name: first and last name, else `@username`, else the
/// catalog's unknown-user text. Brackets are replaced so mentions stay valid.
#[must_use]
pub fn display_name(
    first_name: Option<&str>,
    last_name: Option<&str>,
    username: Option<&str>,
    catalog: &ContentCatalog,
) -> String {
    let parts: Vec<&str> = [first_name, last_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let name = if !parts.is_empty() {
        parts.join(" ")
    } else if let Some(username) = username.filter(|u| !u.is_empty()) {
        format!("@{username}")
    } else {
        catalog.user_unknown.clone()
    };
    name.replace('[', "(").replace(']', ")")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::context::ProposalStatus;
    use std::collections::BTreeSet;

    fn voter(id: i64, name: &str) -> Voter {
        Voter {
            user_id: id,
            display_name: name.to_owned(),
        }
    }

    fn proposal(accepts: Vec<Voter>, rejects: Vec<Voter>) -> Proposal {
        Proposal {
            target_date: NaiveDate::from_ymd_opt(2024, 5, 10).expect("date"),
            question: "Party?".to_owned(),
            status: ProposalStatus::Open,
            pinned: false,
            message_ref: 77,
            accepts,
            rejects,
            guests: BTreeSet::new(),
            revealed: false,
        }
    }

    fn config_with_quorum(quorum: usize) -> TricksterConfig {
        TricksterConfig {
            quorum_size: quorum,
            ..TricksterConfig::default()
        }
    }

    #[test]
    fn below_quorum_shows_only_tallies() {
        let p = proposal(vec![voter(1, "Ann")], vec![voter(2, "Bob")]);
        let text = proposal_text(&p, &config_with_quorum(3));
        assert_eq!(text, "Party?\n\nAccepts: 1\nRejects: 1");
        assert!(!text.contains("Ann"));
    }

    #[test]
    fn quorum_reveals_names_in_shuffled_order() {
        let accepts = vec![voter(1, "Ann"), voter(2, "Bob"), voter(3, "Cid")];
        let mut p = proposal(accepts, vec![voter(4, "Dan")]);
        p.guests.insert(2);
        let text = proposal_text(&p, &config_with_quorum(3));

        let order = random::shuffle(&[1_i64, 2, 3], "77");
        let names: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("• ") && !l.contains("Dan"))
            .collect();
        assert_eq!(names.len(), 3);
        for (line, id) in names.iter().zip(order) {
            assert!(line.ends_with(&format!("(tg://user?id={id})")), "{line}");
        }
        assert!(text.contains("Accepts (3):"));
        assert!(text.contains("[Bob +1](tg://user?id=2)"));
        assert!(text.contains("Rejects (1):\n• [Dan](tg://user?id=4)"));
    }

    #[test]
    fn revealed_flag_keeps_names_below_quorum() {
        let mut p = proposal(vec![voter(1, "Ann")], Vec::new());
        p.revealed = true;
        let text = proposal_text(&p, &config_with_quorum(3));
        assert!(text.contains("• [Ann](tg://user?id=1)"));
        assert!(!text.contains("Rejects"));
    }

    #[test]
    fn closed_proposal_has_no_controls() {
        let catalog = ContentCatalog::default();
        let mut p = proposal(Vec::new(), Vec::new());
        assert!(proposal_options(&p, &catalog, false).controls.is_some());
        p.status = ProposalStatus::Closed;
        assert!(proposal_options(&p, &catalog, false).controls.is_none());
    }

    #[test]
    fn voting_controls_use_callback_data() {
        let controls = voting_controls(&ContentCatalog::default());
        let actions: Vec<&str> = controls
            .rows
            .iter()
            .flatten()
            .map(|b| b.action.as_str())
            .collect();
        assert_eq!(actions, vec!["accept", "reject", "with-guest"]);
    }

    #[test]
    fn template_placeholders_expand() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).expect("date");
        assert_eq!(
            expand_template("Friday {{%-d %B}}? ({{%Y}})", date),
            "Friday 10 May? (2024)"
        );
        assert_eq!(expand_template("no placeholder", date), "no placeholder");
        assert_eq!(expand_template("open {{%d", date), "open {{%d");
    }

    #[test]
    fn display_name_falls_back() {
        let catalog = ContentCatalog::default();
        assert_eq!(
            display_name(Some("Ann"), Some("Lee"), Some("ann"), &catalog),
            "Ann Lee"
        );
        assert_eq!(display_name(None, None, Some("ann"), &catalog), "@ann");
        assert_eq!(display_name(None, None, None, &catalog), "Unknown");
        assert_eq!(display_name(Some("[x]"), None, None, &catalog), "(x)");
    }

    #[test]
    fn introduction_mentions_quorum() {
        let (text, options) = introduction(&config_with_quorum(5), false);
        assert!(text.contains("5 votes"));
        let controls = options.controls.expect("button");
        assert_eq!(controls.rows[0][0].action, PROPOSE_ACTION);
    }
}
