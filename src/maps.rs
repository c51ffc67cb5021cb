// Chinese display names for Hell Let Loose layer ids.

const MAP_NAMES: &[(&str, &str)] = &[
    ("stmariedumont", "圣玛丽德蒙特"),
    ("smdm", "圣玛丽德蒙特"),
    ("stmereeglise", "圣梅尔埃格利斯"),
    ("sme", "圣梅尔埃格利斯"),
    ("remagen", "雷马根"),
    ("omahabeach", "奥马哈海滩"),
    ("stalingrad", "斯大林格勒"),
    ("utahbeach", "犹他海滩"),
    ("kharkov", "哈尔科夫"),
    ("driel", "德里尔"),
    ("drl", "德里尔"),
    ("tobruk", "托布鲁克"),
    ("elsenbornridge", "艾森伯恩岭"),
    ("foy", "佛依"),
    ("hill400", "400号高地"),
    ("hil", "400号高地"),
    ("hurtgenforest", "许特根森林"),
    ("kursk", "库尔斯克"),
    ("carentan", "卡朗唐"),
    ("car", "卡朗唐"),
    ("elalamein", "阿拉曼"),
    ("ela", "阿拉曼"),
    ("purpleheartlane", "紫心小道"),
    ("phl", "紫心小道"),
    ("mortain", "莫尔坦"),
];

/// Checked in order against the whole lowercased id.
const MODES: &[(&[&str], &str)] = &[
    (&["offensive_ger", "offensiveger", "off_ger"], "德军进攻"),
    (&["offensive_us", "offensiveus", "off_us"], "美军进攻"),
    (&["offensive_rus", "offensiverus", "off_rus"], "苏军进攻"),
    (&["offensive_cw", "offensivebritish", "off_cw"], "英军进攻"),
    (&["skirmish"], "遭遇战"),
    (&["warfare"], "冲突"),
];

const TIMES: &[(&str, &str)] = &[
    ("day", "白天"),
    ("night", "夜晚"),
    ("dusk", "黄昏"),
    ("morning", "清晨"),
    ("overcast", "阴天"),
    ("rain", "雨天"),
];

fn map_name(base: &str) -> Option<&'static str> {
    MAP_NAMES
        .iter()
        .find(|(code, _)| *code == base)
        .map(|(_, name)| *name)
}

/// Render a layer id such as `stmereeglise_warfare_night` as
/// `圣梅尔埃格利斯 夜晚 · 冲突`. Unknown maps keep their raw code.
pub fn localize(map_id: &str) -> String {
    let id = map_id.trim().to_ascii_lowercase();
    if id.is_empty() {
        return "未知地图".to_string();
    }
    let mut parts = id.split('_');
    let base = parts.next().unwrap_or_default();
    let Some(name) = map_name(base) else {
        return map_id.trim().to_string();
    };

    let time = parts.find_map(|part| {
        TIMES
            .iter()
            .find(|(key, _)| *key == part)
            .map(|(_, label)| *label)
    });
    let mode = MODES
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| id.contains(p)))
        .map(|(_, label)| *label);

    let mut out = name.to_string();
    if let Some(time) = time {
        out.push(' ');
        out.push_str(time);
    }
    if let Some(mode) = mode {
        out.push_str(" · ");
        out.push_str(mode);
    }
    out
}

/// Resolve what an operator typed after the change-map command against the
/// live rotation: a 1-based rotation number, a layer id, or a localized name.
/// Anything else is passed through as a raw layer id.
pub fn resolve(input: &str, rotation: &[String]) -> Result<String, String> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        return match n.checked_sub(1).and_then(|i| rotation.get(i)) {
            Some(id) => Ok(id.clone()),
            None => Err(format!("地图序号 {n} 不存在（轮换共 {} 张）", rotation.len())),
        };
    }
    if let Some(id) = rotation.iter().find(|id| id.eq_ignore_ascii_case(input)) {
        return Ok(id.clone());
    }
    let wanted = squash(input);
    if let Some(id) = rotation.iter().find(|id| squash(&localize(id)) == wanted) {
        return Ok(id.clone());
    }
    Ok(input.to_string())
}

fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace() && *c != '·').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localize_common_layers() {
        assert_eq!(localize("stmereeglise_warfare"), "圣梅尔埃格利斯 · 冲突");
        assert_eq!(localize("foy_warfare_night"), "佛依 夜晚 · 冲突");
        assert_eq!(localize("kursk_offensive_rus"), "库尔斯克 · 苏军进攻");
        assert_eq!(localize("stmariedumont_off_us"), "圣玛丽德蒙特 · 美军进攻");
        assert_eq!(localize("tobruk_offensivebritish_dusk"), "托布鲁克 黄昏 · 英军进攻");
        assert_eq!(localize("PHL_S_1944_Night_P_Skirmish"), "紫心小道 夜晚 · 遭遇战");
        assert_eq!(localize("mortain_offensiveUS_overcast"), "莫尔坦 阴天 · 美军进攻");
    }

    #[test]
    fn test_localize_unknown_passthrough() {
        assert_eq!(localize("newmap_warfare"), "newmap_warfare");
        assert_eq!(localize(""), "未知地图");
    }

    #[test]
    fn test_resolve_number_id_and_name() {
        let rotation = vec![
            "foy_warfare".to_string(),
            "kursk_offensive_ger".to_string(),
        ];
        assert_eq!(resolve("2", &rotation).unwrap(), "kursk_offensive_ger");
        assert!(resolve("3", &rotation).is_err());
        assert!(resolve("0", &rotation).is_err());
        assert_eq!(resolve("FOY_WARFARE", &rotation).unwrap(), "foy_warfare");
        assert_eq!(resolve("库尔斯克 德军进攻", &rotation).unwrap(), "kursk_offensive_ger");
        assert_eq!(resolve("utahbeach_warfare", &rotation).unwrap(), "utahbeach_warfare");
    }
}
