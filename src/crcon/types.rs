// Response payloads returned by CRCON, decoded leniently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side a player is on, derived from the `team` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Side {
    Allies,
    Axis,
    Unassigned,
}

impl Side {
    pub fn display_name(self) -> &'static str {
        match self {
            Side::Allies => "盟军",
            Side::Axis => "轴心",
            Side::Unassigned => "未分配",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "steam_id_64")]
    pub player_id: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub kills: i64,
    #[serde(default)]
    pub deaths: i64,
}

impl Player {
    pub fn side(&self) -> Side {
        match self.team.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("allies") | Some("allied") => Side::Allies,
            Some("axis") => Side::Axis,
            _ => Side::Unassigned,
        }
    }
}

/// Sort players into roster order: Allies, then Axis, then unassigned,
/// keeping API order within each side.
pub fn roster_order(mut players: Vec<Player>) -> Vec<Player> {
    players.sort_by_key(|p| p.side());
    players
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default, alias = "num_allied_players")]
    pub allied_players: i64,
    #[serde(default, alias = "num_axis_players")]
    pub axis_players: i64,
    #[serde(default)]
    pub allied_score: i64,
    #[serde(default)]
    pub axis_score: i64,
    /// Seconds left in the match.
    #[serde(default)]
    pub time_remaining: Option<f64>,
    #[serde(default, alias = "raw_time_remaining")]
    pub remaining_time: Option<String>,
    /// Either a bare map id or an object describing the layer.
    #[serde(default)]
    pub current_map: Value,
    #[serde(default)]
    pub next_map: Value,
}

impl GameState {
    pub fn current_map_id(&self) -> Option<String> {
        map_id(&self.current_map)
    }

    pub fn next_map_id(&self) -> Option<String> {
        map_id(&self.next_map)
    }

    pub fn player_count(&self) -> i64 {
        self.allied_players + self.axis_players
    }

    /// Remaining time as `H:MM:SS`, preferring the numeric field.
    pub fn remaining_display(&self) -> String {
        match (self.time_remaining, &self.remaining_time) {
            (Some(secs), _) if secs >= 0.0 => {
                let secs = secs as u64;
                format!("{}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
            }
            (_, Some(raw)) if !raw.is_empty() => raw.clone(),
            _ => "未知".to_string(),
        }
    }
}

/// Extract a layer id from a string or `{"id": ...}` object.
pub fn map_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VipEntry {
    #[serde(default, alias = "steam_id_64")]
    pub player_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "vip_expiration")]
    pub expiration: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Snapshot of the tunable server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub idle_autokick_minutes: i64,
    pub autobalance_enabled: bool,
    pub autobalance_threshold: i64,
    pub team_switch_cooldown_minutes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn player(name: &str, team: Option<&str>) -> Player {
        Player {
            name: name.to_string(),
            player_id: format!("id-{name}"),
            team: team.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_roster_order_groups_by_side_stably() {
        let players = vec![
            player("a", Some("axis")),
            player("b", None),
            player("c", Some("allies")),
            player("d", Some("Axis")),
            player("e", Some("allies")),
        ];
        let names: Vec<_> = roster_order(players).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["c", "e", "a", "d", "b"]);
    }

    #[test]
    fn test_player_decodes_with_missing_fields() {
        let p: Player = serde_json::from_value(json!({"name": "x", "steam_id_64": "7656"})).unwrap();
        assert_eq!(p.player_id, "7656");
        assert_eq!(p.side(), Side::Unassigned);
    }

    #[test]
    fn test_gamestate_map_forms() {
        let gs: GameState = serde_json::from_value(json!({
            "num_allied_players": 40,
            "num_axis_players": 38,
            "time_remaining": 3725.0,
            "current_map": {"id": "stmereeglise_warfare", "pretty_name": "St. Mere Eglise"},
            "next_map": "foy_warfare_night"
        }))
        .unwrap();
        assert_eq!(gs.player_count(), 78);
        assert_eq!(gs.current_map_id().as_deref(), Some("stmereeglise_warfare"));
        assert_eq!(gs.next_map_id().as_deref(), Some("foy_warfare_night"));
        assert_eq!(gs.remaining_display(), "1:02:05");
    }

    #[test]
    fn test_gamestate_legacy_fields() {
        let gs: GameState = serde_json::from_value(json!({
            "allied_players": 3,
            "axis_players": 4,
            "raw_time_remaining": "0:10:00",
        }))
        .unwrap();
        assert_eq!(gs.player_count(), 7);
        assert_eq!(gs.remaining_display(), "0:10:00");
        assert!(gs.current_map_id().is_none());
    }
}
