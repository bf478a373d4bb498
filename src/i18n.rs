/// Message tables for the OrangeStreams command line.
/// Locale can be selected via the `--locale` CLI flag (e.g. `--locale zh`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "zh-hans" | "zh-tw" | "zh_tw" => Self::Zh,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub addon_added: &'static str,
    pub addon_removed: &'static str,
    pub addon_not_found: &'static str,
    pub addons_header: &'static str,
    pub no_addons: &'static str,
    pub probe_ok: &'static str,
    pub probe_problems: &'static str,
    pub streams_header: &'static str,
    pub no_streams: &'static str,
    pub addon_failed: &'static str,
    pub addon_skipped: &'static str,
    pub pick_out_of_range: &'static str,
    pub resolving: &'static str,
    pub playable_url: &'static str,
    pub magnet_hint: &'static str,
    pub debrid_saved: &'static str,
    pub debrid_none: &'static str,
    pub error_prefix: &'static str,
    pub info_prefix: &'static str,
}

pub static EN: Messages = Messages {
    addon_added: "Addon registered",
    addon_removed: "Addon removed",
    addon_not_found: "No addon with that id",
    addons_header: "Registered addons",
    no_addons: "No addons registered yet. Add one with `addon add <manifest url>`.",
    probe_ok: "Manifest looks good",
    probe_problems: "Manifest problems",
    streams_header: "Streams",
    no_streams: "No streams found",
    addon_failed: "failed",
    addon_skipped: "skipped",
    pick_out_of_range: "No stream with that number",
    resolving: "Resolving through",
    playable_url: "Playable URL",
    magnet_hint: "No debrid service configured. External players accept this magnet link:",
    debrid_saved: "Debrid settings saved",
    debrid_none: "No debrid service configured",
    error_prefix: "ERR",
    info_prefix: "INFO",
};

pub static ZH: Messages = Messages {
    addon_added: "插件已注册",
    addon_removed: "插件已移除",
    addon_not_found: "没有该 id 的插件",
    addons_header: "已注册插件",
    no_addons: "尚未注册插件。使用 `addon add <manifest url>` 添加。",
    probe_ok: "清单检查通过",
    probe_problems: "清单问题",
    streams_header: "播放源",
    no_streams: "未找到播放源",
    addon_failed: "失败",
    addon_skipped: "已跳过",
    pick_out_of_range: "没有该编号的播放源",
    resolving: "正在解析，服务",
    playable_url: "可播放地址",
    magnet_hint: "未配置 debrid 服务。外部播放器可使用以下磁力链接：",
    debrid_saved: "debrid 设置已保存",
    debrid_none: "未配置 debrid 服务",
    error_prefix: "错误",
    info_prefix: "信息",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    }
}
