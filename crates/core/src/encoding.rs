use std::env;

/// 终端输出编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputEncoding {
    #[default]
    Utf8,
    Ascii,
}

impl OutputEncoding {
    /// 依次读取 `LC_ALL`、`LC_CTYPE`、`LANG`，取第一个非空值
    pub fn detect() -> Self {
        let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .find(|value| !value.is_empty());
        Self::from_locale(locale.as_deref())
    }

    pub fn from_locale(locale: Option<&str>) -> Self {
        let Some(locale) = locale else {
            return OutputEncoding::Utf8;
        };
        let upper = locale.to_ascii_uppercase();
        if upper.contains("UTF-8") || upper.contains("UTF8") {
            OutputEncoding::Utf8
        } else if upper == "C" || upper == "POSIX" || upper.contains("ASCII") {
            OutputEncoding::Ascii
        } else {
            OutputEncoding::Utf8
        }
    }

    /// U+FFFD 表示内容在传输中已经无法解码
    pub fn can_encode(&self, text: &str) -> bool {
        if text.contains(char::REPLACEMENT_CHARACTER) {
            return false;
        }
        match self {
            OutputEncoding::Utf8 => true,
            OutputEncoding::Ascii => text.is_ascii(),
        }
    }
}
