//! 版本比较
//!
//! 遵循 PEP 440 的排序规则：`1.10 > 1.9`，`1.0rc1 < 1.0`，`1.0 == 1.0.0`。
//! 无法按 PEP 440 解析的版本号视为旧式版本，排在所有合法版本之前，
//! 彼此之间按分段比较。

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKind {
    Alpha,
    Beta,
    Rc,
}

// 只有 dev 段的版本排在所有预发布版本之前
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreKind, u64),
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    Release,
}

// 本地标签中数字段大于字母段
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LocalSegment {
    Text(String),
    Number(u64),
}

#[derive(Debug, Clone)]
pub struct Release {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

impl Release {
    fn trimmed_release(&self) -> &[u64] {
        let mut end = self.release.len();
        while end > 0 && self.release[end - 1] == 0 {
            end -= 1;
        }
        &self.release[..end]
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (Some((kind, n)), _, _) => PreKey::Pre(kind, n),
            (None, None, Some(_)) => PreKey::DevOnly,
            (None, _, _) => PreKey::Final,
        }
    }

    fn dev_key(&self) -> DevKey {
        match self.dev {
            Some(n) => DevKey::Dev(n),
            None => DevKey::Release,
        }
    }

    fn cmp_key(&self) -> (u64, &[u64], PreKey, Option<u64>, DevKey, &[LocalSegment]) {
        (
            self.epoch,
            self.trimmed_release(),
            self.pre_key(),
            self.post,
            self.dev_key(),
            &self.local,
        )
    }
}

/// 解析后的版本号
#[derive(Debug, Clone)]
pub enum Version {
    Pep440(Release),
    Legacy(String),
}

impl Version {
    pub fn parse(input: &str) -> Self {
        match parse_pep440(input) {
            Some(release) => Version::Pep440(release),
            None => Version::Legacy(input.trim().to_string()),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Version::Pep440(a), Version::Pep440(b)) => a.cmp_key().cmp(&b.cmp_key()),
            (Version::Legacy(_), Version::Pep440(_)) => Ordering::Less,
            (Version::Pep440(_), Version::Legacy(_)) => Ordering::Greater,
            (Version::Legacy(a), Version::Legacy(b)) => compare_legacy(a, b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// 比较两个版本号
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    Version::parse(a).cmp(&Version::parse(b))
}

/// 返回按版本顺序最大的版本号，列表为空时返回 `None`
pub fn highest_version<S: AsRef<str>>(versions: &[S]) -> Option<String> {
    versions
        .iter()
        .map(|v| (Version::parse(v.as_ref()), v))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, raw)| raw.as_ref().to_string())
}

// 按 `.` 和 `-` 分段，数字段按数值比较，其余按字典序
fn compare_legacy(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<&str> = a.split(['.', '-']).collect();
    let b_parts: Vec<&str> = b.split(['.', '-']).collect();
    let len = a_parts.len().max(b_parts.len());

    for idx in 0..len {
        let a_seg = a_parts.get(idx).copied().unwrap_or("0");
        let b_seg = b_parts.get(idx).copied().unwrap_or("0");

        let ord = match (a_seg.parse::<u64>(), b_seg.parse::<u64>()) {
            (Ok(a_num), Ok(b_num)) => a_num.cmp(&b_num),
            _ => a_seg.cmp(b_seg),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    Ordering::Equal
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.text.as_bytes().get(self.pos + offset).copied()
    }

    fn is_done(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek_at(0).is_some_and(&pred) {
            self.pos += 1;
        }
        let text = self.text;
        &text[start..self.pos]
    }

    fn number(&mut self) -> Option<u64> {
        let start = self.pos;
        let digits = self.take_while(|b| b.is_ascii_digit());
        match digits.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                self.pos = start;
                None
            }
        }
    }

    fn word(&mut self) -> &'a str {
        self.take_while(|b| b.is_ascii_alphabetic())
    }

    fn separator(&mut self) {
        if matches!(self.peek_at(0), Some(b'.' | b'-' | b'_')) {
            self.pos += 1;
        }
    }

    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let start = self.pos;
        let result = f(self);
        if result.is_none() {
            self.pos = start;
        }
        result
    }
}

fn parse_pep440(input: &str) -> Option<Release> {
    let lowered = input.trim().to_ascii_lowercase();
    let text = lowered.strip_prefix('v').unwrap_or(&lowered);

    let (public, local) = match text.split_once('+') {
        Some((public, local)) => (public, Some(local)),
        None => (text, None),
    };
    let (epoch, rest) = match public.split_once('!') {
        Some((epoch, rest)) => (epoch.parse().ok()?, rest),
        None => (0, public),
    };

    let mut cursor = Cursor::new(rest);
    let mut release = vec![cursor.number()?];
    while cursor.peek_at(0) == Some(b'.') && cursor.peek_at(1).is_some_and(|b| b.is_ascii_digit())
    {
        cursor.pos += 1;
        release.push(cursor.number()?);
    }

    let pre = cursor.attempt(|c| {
        c.separator();
        let kind = match c.word() {
            "a" | "alpha" => PreKind::Alpha,
            "b" | "beta" => PreKind::Beta,
            "rc" | "c" | "pre" | "preview" => PreKind::Rc,
            _ => return None,
        };
        c.separator();
        Some((kind, c.number().unwrap_or(0)))
    });

    let post = cursor.attempt(|c| {
        // `1.0-1` 是 `1.0.post1` 的简写
        if c.peek_at(0) == Some(b'-') && c.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            c.pos += 1;
            return c.number();
        }
        c.separator();
        if !matches!(c.word(), "post" | "rev" | "r") {
            return None;
        }
        c.separator();
        Some(c.number().unwrap_or(0))
    });

    let dev = cursor.attempt(|c| {
        c.separator();
        if c.word() != "dev" {
            return None;
        }
        c.separator();
        Some(c.number().unwrap_or(0))
    });

    if !cursor.is_done() {
        return None;
    }

    let local = match local {
        Some(label) => parse_local(label)?,
        None => Vec::new(),
    };

    Some(Release {
        epoch,
        release,
        pre,
        post,
        dev,
        local,
    })
}

fn parse_local(label: &str) -> Option<Vec<LocalSegment>> {
    label
        .split(['.', '-', '_'])
        .map(|segment| {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_alphanumeric()) {
                return None;
            }
            Some(match segment.parse() {
                Ok(n) => LocalSegment::Number(n),
                Err(_) => LocalSegment::Text(segment.to_string()),
            })
        })
        .collect()
}
