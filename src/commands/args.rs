// Typed argument slots and the schema-driven parser.

use std::collections::HashMap;

use crate::crcon::ServerTarget;
use crate::error::{BotError, BotResult};
use crate::selector::IndexSelector;

/// What a slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Player index selector, e.g. `1-5,7`.
    Selector,
    /// One configured server number.
    Server,
    /// Comma separated server numbers, or `全部`/`all`.
    ServerSet,
    /// Ban or VIP duration: hours (`24`, `24h`) or `永久`.
    Duration,
    /// Integer within an inclusive range.
    Number { min: i64, max: i64 },
    /// `启用`/`禁用` and English equivalents.
    Toggle,
    /// Chat identity (QQ number), optionally written as `@123456`.
    Identity,
    /// A single token taken verbatim.
    Word,
    /// The rest of the line, original spacing kept.
    Text,
}

impl SlotKind {
    /// Name used in argument error replies.
    pub fn label(self) -> &'static str {
        match self {
            Self::Selector => "玩家序号",
            Self::Server => "服务器编号",
            Self::ServerSet => "服务器列表",
            Self::Duration => "时长",
            Self::Number { .. } => "数值",
            Self::Toggle => "启用/禁用",
            Self::Identity => "QQ号",
            Self::Word => "参数",
            Self::Text => "内容",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub name: &'static str,
    pub kind: SlotKind,
    pub optional: bool,
}

impl Slot {
    pub const fn required(name: &'static str, kind: SlotKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str, kind: SlotKind) -> Self {
        Self {
            name,
            kind,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanDuration {
    Hours(u32),
    Permanent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Selector(IndexSelector),
    Server(ServerTarget),
    ServerSet(Vec<ServerTarget>),
    Duration(BanDuration),
    Number(i64),
    Toggle(bool),
    Identity(String),
    Word(String),
    Text(String),
}

/// Facts about the deployment that some slots validate against.
#[derive(Debug, Clone, Copy)]
pub struct ArgContext {
    pub server_count: usize,
}

/// Parsed arguments, looked up by slot name.
#[derive(Debug, Default)]
pub struct ParsedArgs {
    values: HashMap<&'static str, ArgValue>,
}

impl ParsedArgs {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn selector(&self, name: &str) -> Option<&IndexSelector> {
        match self.get(name) {
            Some(ArgValue::Selector(s)) => Some(s),
            _ => None,
        }
    }

    /// The `server` slot, defaulting to server 1.
    pub fn server(&self) -> ServerTarget {
        match self.get("server") {
            Some(ArgValue::Server(t)) => *t,
            _ => ServerTarget::default(),
        }
    }

    /// The `servers` slot, defaulting to server 1 only.
    pub fn servers(&self) -> Vec<ServerTarget> {
        match self.get("servers") {
            Some(ArgValue::ServerSet(set)) => set.clone(),
            _ => vec![ServerTarget::default()],
        }
    }

    pub fn duration(&self, name: &str) -> Option<BanDuration> {
        match self.get(name) {
            Some(ArgValue::Duration(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(ArgValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn toggle(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(ArgValue::Toggle(b)) => Some(*b),
            _ => None,
        }
    }

    /// Identity, word or text slot as a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ArgValue::Identity(s)) | Some(ArgValue::Word(s)) | Some(ArgValue::Text(s)) => {
                Some(s)
            }
            _ => None,
        }
    }
}

/// Split on whitespace, remembering where each token starts.
fn tokenize(input: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in input.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push((s, &input[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, &input[s..]));
    }
    tokens
}

/// Fill `schema` from `input` left to right. A token that does not fit an
/// optional slot is left for the next slot.
pub fn parse(schema: &[Slot], usage: &str, input: &str, ctx: ArgContext) -> BotResult<ParsedArgs> {
    let tokens = tokenize(input);
    let mut args = ParsedArgs::default();
    let mut pos = 0;

    for slot in schema {
        if slot.kind == SlotKind::Text {
            let rest = tokens
                .get(pos)
                .map(|(offset, _)| input[*offset..].trim_end())
                .unwrap_or("");
            if rest.is_empty() {
                if !slot.optional {
                    return Err(BotError::invalid_args(usage, format!("缺少{}", slot.kind.label())));
                }
            } else {
                args.values.insert(slot.name, ArgValue::Text(rest.to_string()));
            }
            pos = tokens.len();
            continue;
        }

        let Some((_, token)) = tokens.get(pos) else {
            if slot.optional {
                continue;
            }
            return Err(BotError::invalid_args(usage, format!("缺少{}", slot.kind.label())));
        };

        match parse_slot(slot.kind, token, ctx) {
            Ok(value) => {
                args.values.insert(slot.name, value);
                pos += 1;
            }
            Err(_) if slot.optional => {}
            Err(SlotError::Selector(e)) => return Err(e),
            Err(SlotError::Invalid(reason)) => return Err(BotError::invalid_args(usage, reason)),
        }
    }

    if let Some((_, extra)) = tokens.get(pos) {
        return Err(BotError::invalid_args(usage, format!("多余的参数: {extra}")));
    }
    Ok(args)
}

enum SlotError {
    Selector(BotError),
    Invalid(String),
}

fn parse_slot(kind: SlotKind, token: &str, ctx: ArgContext) -> Result<ArgValue, SlotError> {
    match kind {
        SlotKind::Selector => IndexSelector::parse(token)
            .map(ArgValue::Selector)
            .map_err(SlotError::Selector),
        SlotKind::Server => parse_server(token, ctx).map(ArgValue::Server),
        SlotKind::ServerSet => {
            if matches!(token.to_ascii_lowercase().as_str(), "全部" | "all") {
                return Ok(ArgValue::ServerSet(
                    (1..=ctx.server_count as u32).map(ServerTarget::new).collect(),
                ));
            }
            let mut set = Vec::new();
            for part in token.split([',', '，']) {
                let target = parse_server(part.trim(), ctx)?;
                if !set.contains(&target) {
                    set.push(target);
                }
            }
            set.sort();
            Ok(ArgValue::ServerSet(set))
        }
        SlotKind::Duration => parse_duration(token).map(ArgValue::Duration),
        SlotKind::Number { min, max } => match token.parse::<i64>() {
            Ok(n) if (min..=max).contains(&n) => Ok(ArgValue::Number(n)),
            Ok(n) => Err(SlotError::Invalid(format!("{n} 超出范围 {min}-{max}"))),
            Err(_) => Err(SlotError::Invalid(format!("{token} 不是数字"))),
        },
        SlotKind::Toggle => match token.to_ascii_lowercase().as_str() {
            "启用" | "开启" | "开" | "on" | "enable" | "true" => Ok(ArgValue::Toggle(true)),
            "禁用" | "关闭" | "关" | "off" | "disable" | "false" => Ok(ArgValue::Toggle(false)),
            _ => Err(SlotError::Invalid(format!("{token} 应为 启用/禁用"))),
        },
        SlotKind::Identity => {
            let id = token.trim_start_matches('@');
            if (5..=12).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit()) {
                Ok(ArgValue::Identity(id.to_string()))
            } else {
                Err(SlotError::Invalid(format!("{token} 不是有效的QQ号")))
            }
        }
        SlotKind::Word => Ok(ArgValue::Word(token.to_string())),
        SlotKind::Text => Ok(ArgValue::Text(token.to_string())),
    }
}

fn parse_server(token: &str, ctx: ArgContext) -> Result<ServerTarget, SlotError> {
    match token.parse::<u32>() {
        Ok(n) if n >= 1 && (n as usize) <= ctx.server_count => Ok(ServerTarget::new(n)),
        Ok(n) => Err(SlotError::Invalid(format!(
            "服务器编号 {n} 不存在（共 {} 台）",
            ctx.server_count
        ))),
        Err(_) => Err(SlotError::Invalid(format!("{token} 不是服务器编号"))),
    }
}

fn parse_duration(token: &str) -> Result<BanDuration, SlotError> {
    let lower = token.to_ascii_lowercase();
    if matches!(lower.as_str(), "永久" | "permanent" | "perm" | "perma") {
        return Ok(BanDuration::Permanent);
    }
    let digits = lower
        .strip_suffix("小时")
        .or_else(|| lower.strip_suffix('h'))
        .unwrap_or(&lower);
    match digits.parse::<u32>() {
        Ok(0) => Err(SlotError::Invalid("时长至少为1小时".to_string())),
        Ok(h) => Ok(BanDuration::Hours(h)),
        Err(_) => Err(SlotError::Invalid(format!("{token} 不是有效时长"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: ArgContext = ArgContext { server_count: 2 };

    const KICK: &[Slot] = &[
        Slot::required("selector", SlotKind::Selector),
        Slot::optional("server", SlotKind::Server),
        Slot::optional("reason", SlotKind::Text),
    ];

    const BAN: &[Slot] = &[
        Slot::required("selector", SlotKind::Selector),
        Slot::required("duration", SlotKind::Duration),
        Slot::optional("server", SlotKind::Server),
        Slot::optional("reason", SlotKind::Text),
    ];

    #[test]
    fn test_optional_server_and_reason() {
        let args = parse(KICK, "踢出", "1-3 2 挂机  太久", CTX).unwrap();
        assert_eq!(args.selector("selector").unwrap().to_string(), "1-3");
        assert_eq!(args.server(), ServerTarget::new(2));
        assert_eq!(args.text("reason"), Some("挂机  太久"));
    }

    #[test]
    fn test_non_server_token_falls_through_to_reason() {
        let args = parse(KICK, "踢出", "4 开挂", CTX).unwrap();
        assert_eq!(args.server(), ServerTarget::default());
        assert_eq!(args.text("reason"), Some("开挂"));

        let args = parse(KICK, "踢出", "4", CTX).unwrap();
        assert!(args.text("reason").is_none());
    }

    #[test]
    fn test_unknown_server_falls_through_then_is_reason() {
        // Server 5 is not configured, so "5" becomes part of the reason.
        let args = parse(KICK, "踢出", "1 5 rounds", CTX).unwrap();
        assert_eq!(args.server(), ServerTarget::default());
        assert_eq!(args.text("reason"), Some("5 rounds"));
    }

    #[test]
    fn test_bad_selector_reports_selector_error() {
        assert!(matches!(
            parse(KICK, "踢出", "5-2", CTX),
            Err(BotError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_missing_required_slot() {
        match parse(BAN, "封禁", "1-2", CTX) {
            Err(BotError::InvalidArguments { usage, reason }) => {
                assert_eq!(usage, "封禁");
                assert!(reason.unwrap().contains("时长"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_durations() {
        let args = parse(BAN, "封禁", "1 24h", CTX).unwrap();
        assert_eq!(args.duration("duration"), Some(BanDuration::Hours(24)));
        let args = parse(BAN, "封禁", "1 永久 2 作弊", CTX).unwrap();
        assert_eq!(args.duration("duration"), Some(BanDuration::Permanent));
        assert_eq!(args.server(), ServerTarget::new(2));
        assert!(parse(BAN, "封禁", "1 0", CTX).is_err());
        assert!(parse(BAN, "封禁", "1 soon", CTX).is_err());
    }

    #[test]
    fn test_extra_tokens_rejected() {
        let schema = &[Slot::optional("server", SlotKind::Server)];
        assert!(parse(schema, "服务器信息", "1", CTX).is_ok());
        assert!(matches!(
            parse(schema, "服务器信息", "1 2", CTX),
            Err(BotError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_number_toggle_identity() {
        let schema = &[
            Slot::required("enabled", SlotKind::Toggle),
            Slot::optional("threshold", SlotKind::Number { min: 0, max: 50 }),
            Slot::optional("server", SlotKind::Server),
        ];
        let args = parse(schema, "设置自动平衡", "启用 3 2", CTX).unwrap();
        assert_eq!(args.toggle("enabled"), Some(true));
        assert_eq!(args.number("threshold"), Some(3));
        assert_eq!(args.server(), ServerTarget::new(2));
        assert!(parse(schema, "设置自动平衡", "maybe", CTX).is_err());

        let schema = &[Slot::required("target", SlotKind::Identity)];
        let args = parse(schema, "添加管理员", "@123456789", CTX).unwrap();
        assert_eq!(args.text("target"), Some("123456789"));
        assert!(parse(schema, "添加管理员", "bob", CTX).is_err());
    }

    #[test]
    fn test_server_set() {
        let schema = &[Slot::optional("servers", SlotKind::ServerSet)];
        let args = parse(schema, "删除VIP", "全部", CTX).unwrap();
        assert_eq!(args.servers(), vec![ServerTarget::new(1), ServerTarget::new(2)]);
        let args = parse(schema, "删除VIP", "2,1,2", CTX).unwrap();
        assert_eq!(args.servers(), vec![ServerTarget::new(1), ServerTarget::new(2)]);
        let args = parse(schema, "删除VIP", "", CTX).unwrap();
        assert_eq!(args.servers(), vec![ServerTarget::new(1)]);
    }
}
