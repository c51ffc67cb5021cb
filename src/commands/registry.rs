// Static command table and name/alias lookup.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::args::{Slot, SlotKind};
use crate::permissions::PermissionTier;

/// Which handler a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    ServerInfo,
    ServerList,
    CheckVip,
    BotStatus,
    AdminHelp,
    PlayerList,
    Kill,
    Kick,
    Ban,
    SwitchNow,
    SwitchOnDeath,
    MessagePlayer,
    Broadcast,
    ChangeMap,
    MapList,
    SetIdle,
    ServerSettings,
    SetAutobalance,
    SetSwitchCooldown,
    VipQuery,
    AddVip,
    RemoveVip,
    ListAdmins,
    PermInfo,
    AddAdmin,
    RemoveAdmin,
    ApiTest,
    AddSuperAdmin,
}

#[derive(Debug)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required_tier: PermissionTier,
    pub schema: &'static [Slot],
    /// Argument signature shown after the command name.
    pub usage: &'static str,
    pub summary: &'static str,
}

// ── Schemas ──────────────────────────────────────────────────────────

const NO_ARGS: &[Slot] = &[];

const SERVER_ONLY: &[Slot] = &[Slot::optional("server", SlotKind::Server)];

const SELECTOR_SERVER: &[Slot] = &[
    Slot::required("selector", SlotKind::Selector),
    Slot::optional("server", SlotKind::Server),
];

const SELECTOR_SERVER_REASON: &[Slot] = &[
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

const MESSAGE: &[Slot] = &[
    Slot::required("selector", SlotKind::Selector),
    Slot::optional("server", SlotKind::Server),
    Slot::required("message", SlotKind::Text),
];

const BROADCAST: &[Slot] = &[
    Slot::optional("server", SlotKind::Server),
    Slot::required("message", SlotKind::Text),
];

const CHANGE_MAP: &[Slot] = &[
    Slot::optional("map", SlotKind::Word),
    Slot::optional("server", SlotKind::Server),
];

const MINUTES_SERVER: &[Slot] = &[
    Slot::required("minutes", SlotKind::Number { min: 0, max: 120 }),
    Slot::optional("server", SlotKind::Server),
];

const AUTOBALANCE: &[Slot] = &[
    Slot::required("enabled", SlotKind::Toggle),
    Slot::optional("threshold", SlotKind::Number { min: 0, max: 50 }),
    Slot::optional("server", SlotKind::Server),
];

const NAME_SERVER: &[Slot] = &[
    Slot::required("name", SlotKind::Word),
    Slot::optional("server", SlotKind::Server),
];

const PLAYER_ID_SERVER: &[Slot] = &[
    Slot::required("player_id", SlotKind::Word),
    Slot::optional("server", SlotKind::Server),
];

const ADD_VIP: &[Slot] = &[
    Slot::required("player_id", SlotKind::Word),
    Slot::optional("duration", SlotKind::Duration),
    Slot::optional("servers", SlotKind::ServerSet),
    Slot::optional("description", SlotKind::Text),
];

const REMOVE_VIP: &[Slot] = &[
    Slot::required("player_id", SlotKind::Word),
    Slot::optional("servers", SlotKind::ServerSet),
];

const IDENTITY: &[Slot] = &[Slot::required("target", SlotKind::Identity)];

const OPTIONAL_IDENTITY: &[Slot] = &[Slot::optional("target", SlotKind::Identity)];

// ── Table ────────────────────────────────────────────────────────────

pub static COMMANDS: &[CommandSpec] = &[
    // Public
    CommandSpec {
        kind: CommandKind::Help,
        name: "帮助",
        aliases: &["help", "指令"],
        required_tier: PermissionTier::None,
        schema: NO_ARGS,
        usage: "",
        summary: "显示可用指令",
    },
    CommandSpec {
        kind: CommandKind::ServerInfo,
        name: "服务器信息",
        aliases: &["服务器状态", "server", "serverinfo"],
        required_tier: PermissionTier::None,
        schema: SERVER_ONLY,
        usage: "[服务器编号]",
        summary: "查看比分、人数和地图",
    },
    CommandSpec {
        kind: CommandKind::ServerList,
        name: "服务器列表",
        aliases: &["servers", "serverlist"],
        required_tier: PermissionTier::None,
        schema: NO_ARGS,
        usage: "",
        summary: "查看所有服务器概况",
    },
    CommandSpec {
        kind: CommandKind::CheckVip,
        name: "查询vip",
        aliases: &["checkvip"],
        required_tier: PermissionTier::None,
        schema: NAME_SERVER,
        usage: "<玩家名称> [服务器编号]",
        summary: "按名称查询VIP状态",
    },
    CommandSpec {
        kind: CommandKind::BotStatus,
        name: "状态",
        aliases: &["status", "机器人状态"],
        required_tier: PermissionTier::None,
        schema: NO_ARGS,
        usage: "",
        summary: "查看机器人运行状态",
    },
    // Admin
    CommandSpec {
        kind: CommandKind::AdminHelp,
        name: "管理帮助",
        aliases: &["adminhelp"],
        required_tier: PermissionTier::Admin,
        schema: NO_ARGS,
        usage: "",
        summary: "显示管理指令",
    },
    CommandSpec {
        kind: CommandKind::PlayerList,
        name: "管理员玩家列表",
        aliases: &["adminplayers", "管理玩家", "玩家列表", "players"],
        required_tier: PermissionTier::Admin,
        schema: SERVER_ONLY,
        usage: "[服务器编号]",
        summary: "带序号的在线玩家列表",
    },
    CommandSpec {
        kind: CommandKind::Kill,
        name: "击杀",
        aliases: &["kill", "punish", "管理员击杀"],
        required_tier: PermissionTier::Admin,
        schema: SELECTOR_SERVER_REASON,
        usage: "<序号> [服务器编号] [原因]",
        summary: "击杀指定序号的玩家",
    },
    CommandSpec {
        kind: CommandKind::Kick,
        name: "踢出",
        aliases: &["kick"],
        required_tier: PermissionTier::Admin,
        schema: SELECTOR_SERVER_REASON,
        usage: "<序号> [服务器编号] [原因]",
        summary: "踢出指定序号的玩家",
    },
    CommandSpec {
        kind: CommandKind::Ban,
        name: "封禁",
        aliases: &["ban"],
        required_tier: PermissionTier::Admin,
        schema: BAN,
        usage: "<序号> <小时数|永久> [服务器编号] [原因]",
        summary: "临时或永久封禁玩家",
    },
    CommandSpec {
        kind: CommandKind::SwitchNow,
        name: "立即调边",
        aliases: &["switch", "调边"],
        required_tier: PermissionTier::Admin,
        schema: SELECTOR_SERVER,
        usage: "<序号> [服务器编号]",
        summary: "立即将玩家调到另一阵营",
    },
    CommandSpec {
        kind: CommandKind::SwitchOnDeath,
        name: "死后调边",
        aliases: &["switchdeath"],
        required_tier: PermissionTier::Admin,
        schema: SELECTOR_SERVER,
        usage: "<序号> [服务器编号]",
        summary: "玩家阵亡后调边",
    },
    CommandSpec {
        kind: CommandKind::MessagePlayer,
        name: "私信玩家",
        aliases: &["私信", "msg"],
        required_tier: PermissionTier::Admin,
        schema: MESSAGE,
        usage: "<序号> [服务器编号] <消息内容>",
        summary: "向指定玩家发送游戏内私信",
    },
    CommandSpec {
        kind: CommandKind::Broadcast,
        name: "全体私信",
        aliases: &["广播消息", "broadcast"],
        required_tier: PermissionTier::Admin,
        schema: BROADCAST,
        usage: "[服务器编号] <消息内容>",
        summary: "向所有在线玩家发送私信",
    },
    CommandSpec {
        kind: CommandKind::ChangeMap,
        name: "换图",
        aliases: &["changemap", "切换地图"],
        required_tier: PermissionTier::Admin,
        schema: CHANGE_MAP,
        usage: "[地图编号|地图ID] [服务器编号]",
        summary: "切换地图，不带参数时列出轮换",
    },
    CommandSpec {
        kind: CommandKind::MapList,
        name: "地图列表",
        aliases: &["maplist", "地图轮换"],
        required_tier: PermissionTier::Admin,
        schema: SERVER_ONLY,
        usage: "[服务器编号]",
        summary: "查看地图轮换及编号",
    },
    CommandSpec {
        kind: CommandKind::SetIdle,
        name: "设置闲置时间",
        aliases: &["setidle"],
        required_tier: PermissionTier::Admin,
        schema: MINUTES_SERVER,
        usage: "<分钟 0-120> [服务器编号]",
        summary: "设置闲置自动踢出时间",
    },
    CommandSpec {
        kind: CommandKind::ServerSettings,
        name: "服务器设置",
        aliases: &["serversettings"],
        required_tier: PermissionTier::Admin,
        schema: SERVER_ONLY,
        usage: "[服务器编号]",
        summary: "查看服务器设置",
    },
    CommandSpec {
        kind: CommandKind::SetAutobalance,
        name: "设置自动平衡",
        aliases: &["setautobalance", "自动平衡"],
        required_tier: PermissionTier::Admin,
        schema: AUTOBALANCE,
        usage: "<启用|禁用> [阈值 0-50] [服务器编号]",
        summary: "设置自动人数平衡",
    },
    CommandSpec {
        kind: CommandKind::SetSwitchCooldown,
        name: "设置调边冷却",
        aliases: &["setswitchcooldown", "调边冷却"],
        required_tier: PermissionTier::Admin,
        schema: MINUTES_SERVER,
        usage: "<分钟 0-120> [服务器编号]",
        summary: "设置调边冷却时间",
    },
    CommandSpec {
        kind: CommandKind::VipQuery,
        name: "VIP查询",
        aliases: &["vipquery"],
        required_tier: PermissionTier::Admin,
        schema: PLAYER_ID_SERVER,
        usage: "<玩家ID> [服务器编号]",
        summary: "按玩家ID查询VIP",
    },
    CommandSpec {
        kind: CommandKind::AddVip,
        name: "添加VIP",
        aliases: &["addvip", "vip添加"],
        required_tier: PermissionTier::Admin,
        schema: ADD_VIP,
        usage: "<玩家ID> [小时数|永久] [服务器编号,…|全部] [备注]",
        summary: "添加VIP，默认永久",
    },
    CommandSpec {
        kind: CommandKind::RemoveVip,
        name: "删除VIP",
        aliases: &["removevip", "vip删除"],
        required_tier: PermissionTier::Admin,
        schema: REMOVE_VIP,
        usage: "<玩家ID> [服务器编号,…|全部]",
        summary: "删除VIP",
    },
    CommandSpec {
        kind: CommandKind::ListAdmins,
        name: "管理员列表",
        aliases: &["listadmins", "查看管理员"],
        required_tier: PermissionTier::Admin,
        schema: NO_ARGS,
        usage: "",
        summary: "列出所有管理员",
    },
    CommandSpec {
        kind: CommandKind::PermInfo,
        name: "权限信息",
        aliases: &["perminfo", "我的权限"],
        required_tier: PermissionTier::Admin,
        schema: OPTIONAL_IDENTITY,
        usage: "[QQ号]",
        summary: "查看权限等级",
    },
    // Super admin
    CommandSpec {
        kind: CommandKind::AddAdmin,
        name: "添加管理员",
        aliases: &["addadmin"],
        required_tier: PermissionTier::SuperAdmin,
        schema: IDENTITY,
        usage: "<QQ号>",
        summary: "授予普通管理员",
    },
    CommandSpec {
        kind: CommandKind::RemoveAdmin,
        name: "删除管理员",
        aliases: &["removeadmin"],
        required_tier: PermissionTier::SuperAdmin,
        schema: IDENTITY,
        usage: "<QQ号>",
        summary: "撤销管理员权限",
    },
    CommandSpec {
        kind: CommandKind::ApiTest,
        name: "API测试",
        aliases: &["apitest", "测试连接"],
        required_tier: PermissionTier::SuperAdmin,
        schema: NO_ARGS,
        usage: "",
        summary: "测试所有服务器的API连接",
    },
    // Owner
    CommandSpec {
        kind: CommandKind::AddSuperAdmin,
        name: "添加超级管理员",
        aliases: &["addsuperadmin"],
        required_tier: PermissionTier::Owner,
        schema: IDENTITY,
        usage: "<QQ号>",
        summary: "授予超级管理员",
    },
];

lazy_static! {
    /// Lowercased name or alias to command.
    static ref LOOKUP: HashMap<String, &'static CommandSpec> = {
        let mut map = HashMap::new();
        for spec in COMMANDS {
            for key in std::iter::once(&spec.name).chain(spec.aliases.iter()) {
                map.insert(key.to_lowercase(), spec);
            }
        }
        map
    };

    /// Non-ASCII keys, longest first, for arguments glued to the name.
    static ref GLUED_KEYS: Vec<(String, &'static CommandSpec)> = {
        let mut keys: Vec<(String, &'static CommandSpec)> = LOOKUP
            .iter()
            .filter(|(k, _)| !k.is_ascii())
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        keys
    };
}

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    LOOKUP.get(&name.to_lowercase()).copied()
}

/// Resolve the command at the start of `body` and return it with the
/// remaining argument text. Non-ASCII names may be followed directly by
/// arguments without a space, e.g. `踢出1-3`.
pub fn resolve(body: &str) -> Option<(&'static CommandSpec, &str)> {
    let body = body.trim_start();
    let (head, rest) = match body.find(char::is_whitespace) {
        Some(i) => (&body[..i], &body[i..]),
        None => (body, ""),
    };
    if let Some(spec) = lookup(head) {
        return Some((spec, rest.trim()));
    }
    let lowered = head.to_lowercase();
    for (key, spec) in GLUED_KEYS.iter() {
        if lowered.starts_with(key.as_str()) && lowered.len() > key.len() {
            let glued = body
                .char_indices()
                .nth(key.chars().count())
                .map(|(i, _)| &body[i..])
                .unwrap_or("");
            return Some((spec, glued.trim()));
        }
    }
    None
}

/// Commands a member of `tier` may run, in table order.
pub fn visible_to(tier: PermissionTier) -> impl Iterator<Item = &'static CommandSpec> {
    COMMANDS.iter().filter(move |c| c.required_tier <= tier)
}
