//! Session options.
//!
//! Options are validated against a fixed allow-list. Any allowed key that
//! was never set reads as its ini-style default.

use crate::error::{SessionError, SessionResult};
use crate::id::DEFAULT_ID_LENGTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every option key a session accepts.
pub const ALLOWED_OPTIONS: &[&str] = &[
    "save_path",
    "name",
    "save_handler",
    "auto_start",
    "gc_probability",
    "gc_divisor",
    "gc_maxlifetime",
    "serialize_handler",
    "cookie_lifetime",
    "cookie_path",
    "cookie_domain",
    "cookie_secure",
    "cookie_httponly",
    "cookie_samesite",
    "use_strict_mode",
    "use_cookies",
    "use_only_cookies",
    "referer_check",
    "cache_limiter",
    "cache_expire",
    "use_trans_sid",
    "trans_sid_tags",
    "trans_sid_hosts",
    "sid_length",
    "sid_bits_per_character",
    "upload_progress.enabled",
    "upload_progress.cleanup",
    "upload_progress.prefix",
    "upload_progress.name",
    "upload_progress.freq",
    "upload_progress.min_freq",
    "lazy_write",
    "read_and_close",
];

/// Default session name.
pub const DEFAULT_NAME: &str = "SATCHELSESSID";

/// An option value with ini-style coercions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    /// `""`, `"0"`, `"false"`, `"off"` and `"no"` are false.
    pub fn as_bool(&self) -> bool {
        match self {
            OptionValue::Bool(b) => *b,
            OptionValue::Int(i) => *i != 0,
            OptionValue::Str(s) => {
                let s = s.trim();
                !(s.is_empty()
                    || s == "0"
                    || s.eq_ignore_ascii_case("false")
                    || s.eq_ignore_ascii_case("off")
                    || s.eq_ignore_ascii_case("no"))
            }
        }
    }

    /// Non-numeric strings read as 0.
    pub fn as_i64(&self) -> i64 {
        match self {
            OptionValue::Bool(b) => i64::from(*b),
            OptionValue::Int(i) => *i,
            OptionValue::Str(s) => s.trim().parse().unwrap_or(0),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(true) => f.write_str("1"),
            OptionValue::Bool(false) => f.write_str(""),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

fn default_for(key: &str) -> OptionValue {
    match key {
        "save_path" => std::env::temp_dir().to_string_lossy().into_owned().into(),
        "name" => DEFAULT_NAME.into(),
        "save_handler" => "user".into(),
        "serialize_handler" => "json".into(),
        "gc_probability" => 1.into(),
        "gc_divisor" => 100.into(),
        "gc_maxlifetime" => 1440.into(),
        "cookie_lifetime" => 0.into(),
        "cookie_path" => "/".into(),
        "cache_limiter" => "nocache".into(),
        "cache_expire" => 180.into(),
        "trans_sid_tags" => "a=href,area=href,frame=src,form=".into(),
        "sid_length" => (DEFAULT_ID_LENGTH as i64).into(),
        "sid_bits_per_character" => 6.into(),
        "upload_progress.prefix" => "upload_progress_".into(),
        "upload_progress.name" => "SATCHEL_SESSION_UPLOAD_PROGRESS".into(),
        "upload_progress.freq" => "1%".into(),
        "upload_progress.min_freq" => "1".into(),
        "use_strict_mode" | "use_cookies" | "use_only_cookies" | "lazy_write"
        | "upload_progress.enabled" | "upload_progress.cleanup" => true.into(),
        "auto_start" | "cookie_secure" | "cookie_httponly" | "use_trans_sid" | "read_and_close" => {
            false.into()
        }
        _ => "".into(),
    }
}

/// Fail with `Incorrect option: <key>` for the first key off the allow-list.
pub fn validate_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> SessionResult<()> {
    for key in keys {
        if !ALLOWED_OPTIONS.contains(&key) {
            return Err(SessionError::Configuration(format!("Incorrect option: {}", key)));
        }
    }
    Ok(())
}

/// Cookie attributes derived from the options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CookieParams {
    pub lifetime: i64,
    pub path: String,
    pub domain: String,
    pub secure: bool,
    pub httponly: bool,
    pub samesite: String,
}

/// The option map of one session context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    values: BTreeMap<String, OptionValue>,
}

impl Default for SessionOptions {
    /// Read-only mode, http-only cookies, strict ids, no trans-sid.
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert("read_and_close".to_string(), OptionValue::Bool(true));
        values.insert("cookie_httponly".to_string(), OptionValue::Bool(true));
        values.insert("use_only_cookies".to_string(), OptionValue::Bool(true));
        values.insert("use_trans_sid".to_string(), OptionValue::Bool(false));
        values.insert("use_strict_mode".to_string(), OptionValue::Bool(true));
        Self { values }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one option.
    pub fn set(&mut self, key: &str, value: impl Into<OptionValue>) -> SessionResult<()> {
        validate_keys([key])?;
        self.values.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Set several options. Nothing is applied if any key is refused.
    pub fn merge<K, V, I>(&mut self, options: I) -> SessionResult<()>
    where
        K: Into<String>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let pending: Vec<(String, OptionValue)> = options
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        validate_keys(pending.iter().map(|(k, _)| k.as_str()))?;
        self.values.extend(pending);
        Ok(())
    }

    /// The value of `key`, or its default when unset.
    pub fn get(&self, key: &str) -> SessionResult<OptionValue> {
        validate_keys([key])?;
        match self.values.get(key) {
            Some(OptionValue::Str(s)) if key == "save_path" && s.is_empty() => Ok(default_for(key)),
            Some(value) => Ok(value.clone()),
            None => Ok(default_for(key)),
        }
    }

    /// Whether `key` was set explicitly.
    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Option value coerced the ini way (`""`, `"0"`, `off`, `no` are false).
    pub fn get_bool(&self, key: &str) -> SessionResult<bool> {
        Ok(self.get(key)?.as_bool())
    }

    /// Option value as an integer.
    pub fn get_int(&self, key: &str) -> SessionResult<i64> {
        Ok(self.get(key)?.as_i64())
    }

    /// Option value rendered as a string.
    pub fn get_string(&self, key: &str) -> SessionResult<String> {
        Ok(self.get(key)?.to_string())
    }

    pub fn is_read_only(&self) -> bool {
        self.values
            .get("read_and_close")
            .is_some_and(OptionValue::as_bool)
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.values
            .insert("read_and_close".to_string(), OptionValue::Bool(read_only));
    }

    /// Collect the `cookie_*` options.
    pub fn cookie_params(&self) -> SessionResult<CookieParams> {
        Ok(CookieParams {
            lifetime: self.get_int("cookie_lifetime")?,
            path: self.get_string("cookie_path")?,
            domain: self.get_string("cookie_domain")?,
            secure: self.get_bool("cookie_secure")?,
            httponly: true,
            samesite: self.get_string("cookie_samesite")?,
        })
    }

    /// Expiry for key-value records: the cookie lifetime when positive,
    /// otherwise the gc lifetime.
    pub fn key_value_lifetime(&self) -> SessionResult<i64> {
        let cookie = self.get_int("cookie_lifetime")?;
        if cookie > 0 {
            return Ok(cookie);
        }
        self.get_int("gc_maxlifetime")
    }

    /// Explicitly set options, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
