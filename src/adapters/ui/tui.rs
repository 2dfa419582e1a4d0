//! Implements InputPort. Inquire-based interactive console.
//!
//! Stands in for the chat command surface: the operator picks an identity
//! (member id, group ids, admin flag) and a council, then drives the motion,
//! weight, configuration and archive use cases. Authorization lives here.

use crate::domain::{CloseTarget, Council, DomainError, Motion, VoteChoice, WeightTarget, parse_duration};
use crate::ports::InputPort;
use crate::usecases::{
    ArchiveFormat, ArchiveService, CouncilService, MotionService, Proposal, Voter,
};
use async_trait::async_trait;
use inquire::ui::{Color, RenderConfig, StyleSheet, Styled};
use inquire::{Confirm, CustomType, InquireError, Select, Text};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Neon prompt styling for every subsequent inquire prompt.
pub fn apply_theme() {
    let config = RenderConfig::default_colored()
        .with_prompt_prefix(Styled::new("?").with_fg(Color::LightMagenta))
        .with_highlighted_option_prefix(Styled::new(">").with_fg(Color::LightCyan))
        .with_answer(StyleSheet::new().with_fg(Color::LightCyan));
    inquire::set_global_render_config(config);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuAction {
    SwitchIdentity,
    SelectCouncil,
    SaveCouncil,
    RemoveCouncil,
    Stats,
    Propose,
    Vote,
    Kill,
    Show,
    CheckExpiry,
    LazyVoters,
    Weights,
    Config,
    Export,
    Quit,
}

impl MenuAction {
    const ALL: [MenuAction; 15] = [
        MenuAction::Show,
        MenuAction::Propose,
        MenuAction::Vote,
        MenuAction::Kill,
        MenuAction::CheckExpiry,
        MenuAction::LazyVoters,
        MenuAction::Stats,
        MenuAction::SelectCouncil,
        MenuAction::SaveCouncil,
        MenuAction::RemoveCouncil,
        MenuAction::Weights,
        MenuAction::Config,
        MenuAction::Export,
        MenuAction::SwitchIdentity,
        MenuAction::Quit,
    ];
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MenuAction::SwitchIdentity => "Switch identity",
            MenuAction::SelectCouncil => "Select council",
            MenuAction::SaveCouncil => "Create / rename council",
            MenuAction::RemoveCouncil => "Remove council",
            MenuAction::Stats => "Council stats",
            MenuAction::Propose => "Propose motion",
            MenuAction::Vote => "Vote",
            MenuAction::Kill => "Kill active motion",
            MenuAction::Show => "Show active motion",
            MenuAction::CheckExpiry => "Check expiry",
            MenuAction::LazyVoters => "Lazy voters",
            MenuAction::Weights => "Weights",
            MenuAction::Config => "Configuration",
            MenuAction::Export => "Export archive",
            MenuAction::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// Who is at the keyboard, and which council they act in.
#[derive(Debug, Clone, Default)]
struct Session {
    member_id: i64,
    group_ids: Vec<i64>,
    admin: bool,
    guild_id: i64,
    council: Option<Council>,
}

impl Session {
    fn voter(&self) -> Voter {
        Voter {
            id: self.member_id,
            group_ids: self.group_ids.clone(),
        }
    }

    fn council(&self) -> Result<&Council, DomainError> {
        self.council
            .as_ref()
            .ok_or_else(|| DomainError::CouncilNotFound("no council selected".into()))
    }

    fn require_admin(&self) -> Result<(), DomainError> {
        if self.admin {
            Ok(())
        } else {
            Err(DomainError::Ui("this action needs an admin identity".into()))
        }
    }
}

fn ui_err(e: InquireError) -> DomainError {
    DomainError::Ui(e.to_string())
}

fn is_cancel(e: &InquireError) -> bool {
    matches!(
        e,
        InquireError::OperationCanceled | InquireError::OperationInterrupted
    )
}

/// Comma or whitespace separated ids; blank input gives an empty list.
fn parse_ids(input: &str) -> Result<Vec<i64>, DomainError> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| DomainError::Ui(format!("'{}' is not a numeric id", s)))
        })
        .collect()
}

/// JSON when it parses, otherwise the raw text as a string.
fn parse_config_value(raw: &str) -> Value {
    let raw = raw.trim();
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn describe(motion: &Motion) -> String {
    let mut out = format!(
        "#{} [{}] \"{}\" by {} (needs {})",
        motion.id,
        motion.status,
        motion.text,
        motion.author_id,
        motion.requirement()
    );
    if let Some(at) = motion.expires_at {
        out.push_str(&format!(", expires {}", at.format("%Y-%m-%d %H:%M UTC")));
    }
    out
}

/// Console adapter. Inquire prompts.
pub struct ConsoleInputPort {
    motions: Arc<MotionService>,
    councils: Arc<CouncilService>,
    archives: Arc<ArchiveService>,
}

impl ConsoleInputPort {
    pub fn new(
        motions: Arc<MotionService>,
        councils: Arc<CouncilService>,
        archives: Arc<ArchiveService>,
    ) -> Self {
        Self {
            motions,
            councils,
            archives,
        }
    }

    fn prompt_identity(&self, session: &mut Session) -> Result<(), InquireError> {
        session.member_id = CustomType::<i64>::new("Your member id:")
            .with_default(session.member_id)
            .prompt()?;
        let groups = Text::new("Your group ids (comma separated):")
            .with_default(
                &session
                    .group_ids
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(","),
            )
            .prompt()?;
        session.group_ids = match parse_ids(&groups) {
            Ok(ids) => ids,
            Err(e) => {
                println!("✗ {} (groups cleared)", e);
                Vec::new()
            }
        };
        session.admin = Confirm::new("Act as admin?")
            .with_default(session.admin)
            .prompt()?;
        session.guild_id = CustomType::<i64>::new("Guild id:")
            .with_default(session.guild_id)
            .prompt()?;
        Ok(())
    }

    async fn select_council(&self, session: &mut Session) -> Result<(), DomainError> {
        let councils = self.councils.list().await?;
        if councils.is_empty() {
            println!("No councils yet. Create one first.");
            return Ok(());
        }
        let labels: Vec<String> = councils
            .iter()
            .map(|c| format!("{} (channel {})", c.name, c.channel_id))
            .collect();
        let picked = Select::new("Council:", labels.clone())
            .prompt()
            .map_err(ui_err)?;
        session.council = labels
            .iter()
            .position(|l| *l == picked)
            .and_then(|i| councils.get(i).cloned());
        Ok(())
    }

    async fn save_council(&self, session: &mut Session) -> Result<(), DomainError> {
        session.require_admin()?;
        let channel_id = CustomType::<i64>::new("Channel id:")
            .prompt()
            .map_err(ui_err)?;
        let name = Text::new("Council name:").prompt().map_err(ui_err)?;
        let council = self
            .councils
            .create_or_rename(session.guild_id, channel_id, &name)
            .await?;
        println!("✓ Council \"{}\" bound to channel {}", council.name, council.channel_id);
        session.council = Some(council);
        Ok(())
    }

    async fn remove_council(&self, session: &mut Session) -> Result<(), DomainError> {
        session.require_admin()?;
        let channel_id = session.council()?.channel_id;
        // The selection may be stale: renamed or removed since it was picked.
        let council = match self.councils.by_channel(channel_id).await {
            Ok(council) => council,
            Err(e @ DomainError::CouncilNotFound(_)) => {
                session.council = None;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let sure = Confirm::new(&format!("Remove council \"{}\"?", council.name))
            .with_default(false)
            .prompt()
            .map_err(ui_err)?;
        if !sure {
            return Ok(());
        }
        self.councils.remove(council.channel_id).await?;
        println!("✓ Council \"{}\" removed", council.name);
        session.council = None;
        Ok(())
    }

    async fn stats(&self, session: &Session) -> Result<(), DomainError> {
        let stats = self.councils.stats(session.council()?.id).await?;
        println!("Council \"{}\"", stats.council.name);
        println!(
            "  motions: {} (passed {}, killed {}, expired {}, failed {}, active {})",
            stats.counts.total(),
            stats.counts.passed,
            stats.counts.killed,
            stats.counts.expired,
            stats.counts.failed,
            stats.counts.active
        );
        if let Some((motion, tally)) = stats.active {
            println!("  active: {}", describe(&motion));
            println!("  tally: {}", tally);
        }
        Ok(())
    }

    async fn propose(&self, session: &Session) -> Result<(), DomainError> {
        let council = session.council()?;
        let text = Text::new("Motion text:").prompt().map_err(ui_err)?;
        if text.trim().is_empty() {
            return Err(DomainError::Ui("motion text cannot be empty".into()));
        }

        let default_majority = self
            .councils
            .default_majority(council.id)
            .await?
            .unwrap_or_else(|| "1/2".to_string());
        let majority = Text::new("Majority (e.g. 2/3 or 66%):")
            .with_default(&default_majority)
            .prompt()
            .map_err(ui_err)?;
        let unanimous = Confirm::new("Require unanimity?")
            .with_default(false)
            .prompt()
            .map_err(ui_err)?;
        let duration = Text::new("Duration (e.g. 30m, 2h, 1d; blank for none):")
            .prompt()
            .map_err(ui_err)?;
        let expires_in = match duration.trim() {
            "" => None,
            d => Some(parse_duration(d)?),
        };

        let motion = self
            .motions
            .propose(Proposal {
                council_id: council.id,
                author_id: session.member_id,
                text: text.trim().to_string(),
                majority: Some(majority),
                unanimous,
                expires_in,
            })
            .await?;
        println!("✓ Proposed {}", describe(&motion));
        Ok(())
    }

    async fn active_motion(&self, session: &Session) -> Result<Option<Motion>, DomainError> {
        let motion = self.motions.get_active(session.council()?.id).await?;
        if motion.is_none() {
            println!("No active motion.");
        }
        Ok(motion)
    }

    async fn vote(&self, session: &Session) -> Result<(), DomainError> {
        let Some(motion) = self.active_motion(session).await? else {
            return Ok(());
        };
        println!("{}", describe(&motion));
        let choice = Select::new(
            "Your vote:",
            vec![VoteChoice::Yes, VoteChoice::No, VoteChoice::Abstain],
        )
        .prompt()
        .map_err(ui_err)?;

        let required = self.councils.reason_required(motion.council_id).await?;
        let prompt = if required { "Reason:" } else { "Reason (optional):" };
        let reason = Text::new(prompt).prompt().map_err(ui_err)?;
        if required && reason.trim().is_empty() {
            return Err(DomainError::Ui("this council requires a reason".into()));
        }
        let reason = Some(reason).filter(|r| !r.trim().is_empty());

        let outcome = self
            .motions
            .cast_vote_as(motion.id, &session.voter(), choice, reason)
            .await?;
        if outcome.replaced_previous {
            println!("✓ Vote changed. Tally: {}", outcome.tally);
        } else {
            println!("✓ Vote recorded. Tally: {}", outcome.tally);
        }
        if outcome.closed_motion() {
            println!("★ Motion #{} {}", outcome.motion_id, outcome.status);
        }
        Ok(())
    }

    async fn kill(&self, session: &Session) -> Result<(), DomainError> {
        let Some(motion) = self.active_motion(session).await? else {
            return Ok(());
        };
        if motion.author_id != session.member_id && !session.admin {
            return Err(DomainError::Ui(
                "only the proposer or an admin can kill a motion".into(),
            ));
        }
        let closed = self
            .motions
            .close(motion.id, session.member_id, CloseTarget::Killed)
            .await?;
        println!("✓ Motion #{} {}", closed.id, closed.status);
        Ok(())
    }

    async fn show(&self, session: &Session) -> Result<(), DomainError> {
        let Some(motion) = self.active_motion(session).await? else {
            return Ok(());
        };
        let tally = self.motions.get_totals(motion.id).await?;
        println!("{}", describe(&motion));
        println!("  tally: {}", tally);
        for vote in self.motions.votes(motion.id).await? {
            match &vote.reason {
                Some(reason) => println!(
                    "  {} voted {} (weight {}): {}",
                    vote.voter_id, vote.choice, vote.weight, reason
                ),
                None => println!(
                    "  {} voted {} (weight {})",
                    vote.voter_id, vote.choice, vote.weight
                ),
            }
        }
        Ok(())
    }

    async fn check_expiry(&self, session: &Session) -> Result<(), DomainError> {
        match self.motions.expire_if_overdue(session.council()?.id).await? {
            Some(motion) => println!("✓ Motion #{} expired", motion.id),
            None => println!("Nothing overdue."),
        }
        Ok(())
    }

    async fn lazy_voters(&self, session: &Session) -> Result<(), DomainError> {
        let Some(motion) = self.active_motion(session).await? else {
            return Ok(());
        };
        let raw = Text::new("Eligible member ids (comma separated):")
            .prompt()
            .map_err(ui_err)?;
        let eligible = parse_ids(&raw)?;
        let pending = self.motions.pending_voters(motion.id, &eligible).await?;
        if pending.is_empty() {
            println!("Everyone has voted.");
        } else {
            let ids: Vec<String> = pending.iter().map(i64::to_string).collect();
            println!("Not voted yet: {}", ids.join(", "));
        }
        Ok(())
    }

    fn prompt_target() -> Result<WeightTarget, DomainError> {
        let kind = Select::new("Target:", vec!["member", "group"])
            .prompt()
            .map_err(ui_err)?;
        let id = CustomType::<i64>::new(&format!("{} id:", kind))
            .prompt()
            .map_err(ui_err)?;
        WeightTarget::from_parts(kind, id)
    }

    async fn weights(&self, session: &Session) -> Result<(), DomainError> {
        let council_id = session.council()?.id;
        let action = Select::new("Weights:", vec!["List", "Set", "Remove"])
            .prompt()
            .map_err(ui_err)?;
        match action {
            "Set" => {
                session.require_admin()?;
                let target = Self::prompt_target()?;
                let weight = CustomType::<u64>::new("Weight:")
                    .prompt()
                    .map_err(ui_err)?;
                self.councils.set_weight(council_id, target, weight).await?;
                println!("✓ {} now weighs {}", target, weight);
            }
            "Remove" => {
                session.require_admin()?;
                let target = Self::prompt_target()?;
                if self.councils.remove_weight(council_id, target).await? {
                    println!("✓ Weight of {} removed", target);
                } else {
                    println!("{} had no weight assigned", target);
                }
            }
            _ => {
                let weights = self.councils.weights(council_id).await?;
                if weights.is_empty() {
                    println!("No weights assigned; everyone weighs 1.");
                }
                for w in weights {
                    println!("  {}: {}", w.target, w.weight);
                }
            }
        }
        Ok(())
    }

    async fn config(&self, session: &Session) -> Result<(), DomainError> {
        let council_id = session.council()?.id;
        let action = Select::new("Configuration:", vec!["List", "Set", "Unset"])
            .prompt()
            .map_err(ui_err)?;
        match action {
            "Set" => {
                session.require_admin()?;
                let key = Text::new("Key:").prompt().map_err(ui_err)?;
                let raw = Text::new("Value (JSON or text):").prompt().map_err(ui_err)?;
                self.councils
                    .set_config(council_id, &key, parse_config_value(&raw))
                    .await?;
                println!("✓ {} set", key.trim());
            }
            "Unset" => {
                session.require_admin()?;
                let key = Text::new("Key:").prompt().map_err(ui_err)?;
                if self.councils.unset_config(council_id, &key).await? {
                    println!("✓ {} removed", key.trim());
                } else {
                    println!("{} was not set", key.trim());
                }
            }
            _ => {
                let configs = self.councils.configs(council_id).await?;
                if configs.is_empty() {
                    println!("No configuration.");
                }
                for (key, value) in configs {
                    println!("  {} = {}", key, value);
                }
            }
        }
        Ok(())
    }

    async fn export(&self, session: &Session) -> Result<(), DomainError> {
        let council_id = session.council()?.id;
        let format = Select::new("Format:", vec![ArchiveFormat::Json, ArchiveFormat::Csv])
            .prompt()
            .map_err(ui_err)?;
        let path = self.archives.export(council_id, format).await?;
        println!("✓ Archive written to {}", path.display());
        Ok(())
    }

    async fn dispatch(&self, action: MenuAction, session: &mut Session) -> Result<(), DomainError> {
        match action {
            MenuAction::SwitchIdentity => self.prompt_identity(session).map_err(ui_err),
            MenuAction::SelectCouncil => self.select_council(session).await,
            MenuAction::SaveCouncil => self.save_council(session).await,
            MenuAction::RemoveCouncil => self.remove_council(session).await,
            MenuAction::Stats => self.stats(session).await,
            MenuAction::Propose => self.propose(session).await,
            MenuAction::Vote => self.vote(session).await,
            MenuAction::Kill => self.kill(session).await,
            MenuAction::Show => self.show(session).await,
            MenuAction::CheckExpiry => self.check_expiry(session).await,
            MenuAction::LazyVoters => self.lazy_voters(session).await,
            MenuAction::Weights => self.weights(session).await,
            MenuAction::Config => self.config(session).await,
            MenuAction::Export => self.export(session).await,
            MenuAction::Quit => Ok(()),
        }
    }
}

#[async_trait]
impl InputPort for ConsoleInputPort {
    async fn run(&self) -> Result<(), DomainError> {
        let mut session = Session::default();
        match self.prompt_identity(&mut session) {
            Ok(()) => {}
            Err(e) if is_cancel(&e) => return Ok(()),
            Err(e) => return Err(ui_err(e)),
        }
        if let Ok(councils) = self.councils.list().await {
            session.council = councils.into_iter().next();
        }

        loop {
            let title = match &session.council {
                Some(c) => format!("[{} | member {}] Choose an action:", c.name, session.member_id),
                None => format!("[no council | member {}] Choose an action:", session.member_id),
            };
            let action = match Select::new(&title, MenuAction::ALL.to_vec()).prompt() {
                Ok(a) => a,
                Err(e) if is_cancel(&e) => return Ok(()),
                Err(e) => return Err(ui_err(e)),
            };
            if action == MenuAction::Quit {
                return Ok(());
            }
            if let Err(e) = self.dispatch(action, &mut session).await {
                warn!(action = %action, error = %e, "console action failed");
                println!("✗ {}", e);
            }
        }
    }
}
