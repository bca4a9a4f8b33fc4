//! Verbosity filtering
//!
//! A call site at verbosity `n` is enabled when `n` is at or below the
//! global level, or at or below the level of the first per-file rule that
//! matches the call site's source file. Rules can only raise verbosity for a
//! file; they never hide output the global level already enables.
//!
//! Rules use the familiar `pattern=N,pattern=N` syntax. A pattern without a
//! `/` is compared with the base name of the source file minus its
//! extension, so `output=11` applies to `output.rs` (or `output.go`) but not
//! to `output_helper.rs`. A pattern with a `/` is compared with the path
//! minus its extension, and with every suffix of that path that starts after
//! a `/`. `*`, `?`, `[...]` and `\` have their glob meaning; `*` and `?`
//! never match `/`.

use super::error::{LoggerError, Result};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Verbosity level of a call site or threshold
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Level(pub i32);

impl From<i32> for Level {
    fn from(level: i32) -> Self {
        Level(level)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Level {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i32>()
            .map(Level)
            .map_err(|_| LoggerError::InvalidLevel(s.to_string()))
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Literal(String),
    Glob(Regex),
}

/// One `pattern=N` rule
#[derive(Debug, Clone)]
pub struct VModuleRule {
    pattern: String,
    full_path: bool,
    matcher: Matcher,
    level: Level,
}

impl VModuleRule {
    /// Compile a rule.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidVModule`] for an empty pattern or broken
    /// glob syntax.
    pub fn new(pattern: &str, level: Level) -> Result<Self> {
        if pattern.is_empty() {
            return Err(LoggerError::vmodule(
                format!("={}", level),
                "pattern must not be empty",
            ));
        }

        let has_meta = pattern
            .chars()
            .any(|c| matches!(c, '*' | '?' | '[' | '\\'));
        let matcher = if has_meta {
            Matcher::Glob(glob_to_regex(pattern)?)
        } else {
            Matcher::Literal(pattern.to_string())
        };

        Ok(Self {
            pattern: pattern.to_string(),
            full_path: pattern.contains('/'),
            matcher,
            level,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Whether this rule applies to the given source file path
    pub fn matches(&self, file: &str) -> bool {
        if !self.full_path {
            return self.matches_subject(module_name(file));
        }

        let normalized: Cow<'_, str> = if file.contains('\\') {
            Cow::Owned(file.replace('\\', "/"))
        } else {
            Cow::Borrowed(file)
        };
        let subject = strip_extension(&normalized);
        if self.matches_subject(subject) {
            return true;
        }
        subject
            .match_indices('/')
            .any(|(idx, _)| self.matches_subject(&subject[idx + 1..]))
    }

    fn matches_subject(&self, subject: &str) -> bool {
        match &self.matcher {
            Matcher::Literal(literal) => literal == subject,
            Matcher::Glob(regex) => regex.is_match(subject),
        }
    }
}

/// Base name without directory and extension
fn module_name(file: &str) -> &str {
    let base = file.rsplit(&['/', '\\'][..]).next().unwrap_or(file);
    match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    }
}

fn strip_extension(path: &str) -> &str {
    let base_start = path.rfind('/').map_or(0, |idx| idx + 1);
    match path[base_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..base_start + dot],
        _ => path,
    }
}

fn push_escaped(re: &mut String, c: char) {
    let mut buf = [0u8; 4];
    re.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

fn push_class_char(re: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
        re.push('\\');
    }
    re.push(c);
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '\\' => match chars.next() {
                Some(escaped) => push_escaped(&mut re, escaped),
                None => return Err(LoggerError::vmodule(pattern, "trailing escape character")),
            },
            '[' => {
                re.push('[');
                if matches!(chars.peek(), Some('!') | Some('^')) {
                    chars.next();
                    re.push('^');
                }
                let mut closed = false;
                let mut empty = true;
                while let Some(c) = chars.next() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some(escaped) => push_class_char(&mut re, escaped),
                            None => {
                                return Err(LoggerError::vmodule(
                                    pattern,
                                    "trailing escape character",
                                ))
                            }
                        },
                        '-' => re.push('-'),
                        other => push_class_char(&mut re, other),
                    }
                    empty = false;
                }
                if !closed {
                    return Err(LoggerError::vmodule(pattern, "unterminated character class"));
                }
                if empty {
                    return Err(LoggerError::vmodule(pattern, "empty character class"));
                }
                re.push(']');
            }
            other => push_escaped(&mut re, other),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| LoggerError::vmodule(pattern, e.to_string()))
}

/// Ordered list of per-file rules
#[derive(Debug, Clone, Default)]
pub struct VModule {
    rules: Vec<VModuleRule>,
}

impl VModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `pattern=N,pattern=N`. Empty entries are ignored.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed entry; nothing is returned in that case.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (pattern, level) = entry
                .split_once('=')
                .ok_or_else(|| LoggerError::vmodule(entry, "expected pattern=N"))?;
            if level.contains('=') {
                return Err(LoggerError::vmodule(entry, "expected pattern=N"));
            }
            let level = level
                .trim()
                .parse::<i32>()
                .map_err(|_| LoggerError::vmodule(entry, "level is not an integer"))?;
            rules.push(VModuleRule::new(pattern.trim(), Level(level))?);
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[VModuleRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Level of the first rule matching `file`
    pub fn level_for(&self, file: &str) -> Option<Level> {
        self.rules
            .iter()
            .find(|rule| rule.matches(file))
            .map(|rule| rule.level)
    }

    /// Replace the level of a rule with the same pattern, or append.
    pub fn add_or_replace(&mut self, rule: VModuleRule) {
        match self.rules.iter_mut().find(|r| r.pattern == rule.pattern) {
            Some(existing) => existing.level = rule.level,
            None => self.rules.push(rule),
        }
    }
}

impl fmt::Display for VModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", rule.pattern, rule.level)?;
        }
        Ok(())
    }
}

impl FromStr for VModule {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self> {
        VModule::parse(s)
    }
}

/// Immutable verbosity configuration as seen by log calls.
#[derive(Debug)]
pub(crate) struct VerbositySnapshot {
    global: Level,
    vmodule: Arc<VModule>,
    /// Rule level per source file; belongs to `vmodule`.
    cache: Arc<RwLock<HashMap<String, Option<Level>>>>,
}

impl VerbositySnapshot {
    fn new(global: Level, vmodule: Arc<VModule>) -> Self {
        Self {
            global,
            vmodule,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn file_level(&self, file: &str) -> Option<Level> {
        if let Some(level) = self.cache.read().get(file) {
            return *level;
        }
        let level = self.vmodule.level_for(file);
        self.cache.write().insert(file.to_string(), level);
        level
    }
}

/// Process-wide verbosity state: a global level and per-file rules.
///
/// Reads never lock; updates build a new snapshot and publish it.
pub struct VerbosityController {
    current: ArcSwap<VerbositySnapshot>,
    write_lock: Mutex<()>,
}

impl VerbosityController {
    pub fn new() -> Self {
        Self::with_level(Level(0))
    }

    pub fn with_level(level: Level) -> Self {
        Self {
            current: ArcSwap::from_pointee(VerbositySnapshot::new(
                level,
                Arc::new(VModule::new()),
            )),
            write_lock: Mutex::new(()),
        }
    }

    /// Whether a call at `level` from source file `file` is enabled
    #[inline]
    pub fn enabled(&self, level: Level, file: &str) -> bool {
        let snapshot = self.current.load();
        if snapshot.global >= level {
            return true;
        }
        if snapshot.vmodule.is_empty() {
            return false;
        }
        snapshot.file_level(file).is_some_and(|rule| rule >= level)
    }

    pub fn global_level(&self) -> Level {
        self.current.load().global
    }

    pub fn set_global_level(&self, level: Level) {
        let _guard = self.write_lock.lock();
        let current = self.current.load_full();
        self.current.store(Arc::new(VerbositySnapshot {
            global: level,
            vmodule: Arc::clone(&current.vmodule),
            cache: Arc::clone(&current.cache),
        }));
    }

    /// Replace all rules from a `pattern=N,...` specification.
    ///
    /// # Errors
    ///
    /// On a syntax error the previous rules stay installed.
    pub fn set_vmodule(&self, spec: &str) -> Result<()> {
        let vmodule = VModule::parse(spec)?;
        self.replace_rules(vmodule);
        Ok(())
    }

    pub fn replace_rules(&self, vmodule: VModule) {
        let _guard = self.write_lock.lock();
        let global = self.current.load().global;
        self.current
            .store(Arc::new(VerbositySnapshot::new(global, Arc::new(vmodule))));
    }

    /// Merge rules into the current set: same pattern replaces the level in
    /// place, new patterns go to the end.
    ///
    /// # Errors
    ///
    /// If any pattern fails to compile no rule is installed.
    pub fn add_or_replace_rules<I, P>(&self, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = (P, Level)>,
        P: AsRef<str>,
    {
        let compiled = rules
            .into_iter()
            .map(|(pattern, level)| VModuleRule::new(pattern.as_ref(), level))
            .collect::<Result<Vec<_>>>()?;

        let _guard = self.write_lock.lock();
        let current = self.current.load_full();
        let mut vmodule = (*current.vmodule).clone();
        for rule in compiled {
            vmodule.add_or_replace(rule);
        }
        self.current.store(Arc::new(VerbositySnapshot::new(
            current.global,
            Arc::new(vmodule),
        )));
        Ok(())
    }

    pub fn clear_rules(&self) {
        self.replace_rules(VModule::new());
    }

    /// Currently installed rules
    pub fn vmodule(&self) -> VModule {
        (*self.current.load().vmodule).clone()
    }

    pub(crate) fn snapshot(&self) -> Arc<VerbositySnapshot> {
        self.current.load_full()
    }

    pub(crate) fn restore(&self, snapshot: Arc<VerbositySnapshot>) {
        let _guard = self.write_lock.lock();
        self.current.store(snapshot);
    }
}

impl Default for VerbosityController {
    fn default() -> Self {
        Self::new()
    }
}
