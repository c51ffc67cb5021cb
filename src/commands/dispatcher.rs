// Turns one inbound chat line into at most one reply.

use std::sync::Arc;
use std::time::Instant;

use super::args::{self, ArgContext};
use super::handlers;
use super::registry::{self, CommandSpec};
use crate::config::Config;
use crate::crcon::health::HealthMonitor;
use crate::crcon::CrconClient;
use crate::error::{BotError, BotResult};
use crate::format;
use crate::metrics;
use crate::permissions::{PermissionStore, PermissionTier};

/// A chat message as delivered by the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Sender identity (QQ number).
    pub sender: String,
    /// Plain text with transport markup removed.
    pub text: String,
    /// Whether the bot was @-mentioned.
    pub mentioned: bool,
}

pub struct Dispatcher {
    pub(crate) config: Arc<Config>,
    pub(crate) permissions: Arc<PermissionStore>,
    pub(crate) crcon: CrconClient,
    pub(crate) health: HealthMonitor,
    pub(crate) started_at: Instant,
    /// Non-empty prefixes, longest first.
    prefixes: Vec<String>,
    prefix_optional: bool,
    /// Prefix shown in help and usage text.
    pub(crate) display_prefix: String,
}

impl Dispatcher {
    pub fn new(
        config: Arc<Config>,
        permissions: Arc<PermissionStore>,
        crcon: CrconClient,
        health: HealthMonitor,
    ) -> Self {
        let prefix_optional = config.command_prefixes.iter().any(|p| p.is_empty());
        let display_prefix = config
            .command_prefixes
            .iter()
            .find(|p| !p.is_empty())
            .cloned()
            .unwrap_or_default();
        let mut prefixes: Vec<String> = config
            .command_prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()));
        Self {
            config,
            permissions,
            crcon,
            health,
            started_at: Instant::now(),
            prefixes,
            prefix_optional,
            display_prefix,
        }
    }

    fn strip_prefix<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.prefixes
            .iter()
            .find_map(|p| text.strip_prefix(p.as_str()))
            .map(str::trim_start)
    }

    /// Handle one message. `None` means the bot stays silent.
    pub async fn handle(&self, msg: &InboundMessage) -> Option<String> {
        let text = msg.text.trim();
        let (body, prefixed) = match self.strip_prefix(text) {
            Some(body) => (body, true),
            None if self.prefix_optional || msg.mentioned => (text, false),
            None => return None,
        };
        if body.is_empty() {
            return None;
        }
        let addressed = prefixed || msg.mentioned;

        let Some((spec, rest)) = registry::resolve(body) else {
            if !addressed {
                return None;
            }
            let name = body.split_whitespace().next().unwrap_or_default();
            tracing::debug!(sender = %msg.sender, command = name, "unknown command");
            metrics::COMMANDS_TOTAL
                .with_label_values(&["unknown", "unknown_command"])
                .inc();
            let err = BotError::UnknownCommand(name.to_string());
            return Some(format::error_reply(
                &err,
                &self.display_prefix,
                &self.config.servers,
            ));
        };

        let tier = self.permissions.get_tier(&msg.sender);
        tracing::info!(
            command = spec.name,
            sender = %msg.sender,
            tier = tier.as_str(),
            "handling command"
        );

        let reply = match self.execute(spec, tier, &msg.sender, rest).await {
            Ok(reply) => {
                metrics::COMMANDS_TOTAL
                    .with_label_values(&[spec.name, "ok"])
                    .inc();
                reply
            }
            Err(e) => {
                metrics::COMMANDS_TOTAL
                    .with_label_values(&[spec.name, e.error_code()])
                    .inc();
                if e.is_internal() {
                    tracing::error!(command = spec.name, sender = %msg.sender, "command failed: {e}");
                } else if matches!(e, BotError::ApiError { .. } | BotError::ApiUnreachable(_)) {
                    tracing::warn!(command = spec.name, sender = %msg.sender, "command failed: {e}");
                } else {
                    tracing::debug!(command = spec.name, sender = %msg.sender, "command rejected: {e}");
                }
                format::error_reply(&e, &self.display_prefix, &self.config.servers)
            }
        };
        Some(reply)
    }

    async fn execute(
        &self,
        spec: &'static CommandSpec,
        tier: PermissionTier,
        sender: &str,
        rest: &str,
    ) -> BotResult<String> {
        if tier < spec.required_tier {
            return Err(BotError::InsufficientPrivilege {
                required: spec.required_tier,
                actual: tier,
            });
        }
        let usage = format::usage_line(&self.display_prefix, spec);
        let ctx = ArgContext {
            server_count: self.config.servers.len(),
        };
        let args = args::parse(spec.schema, &usage, rest, ctx)?;
        handlers::run(self, spec, tier, sender, &args).await
    }
}
