//! Connection target and URL normalization: a small typed settings bundle
//! built once from a base plus an overlay, then left immutable for the
//! rest of a connection attempt.

use std::collections::HashMap;

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::consts::{DEFAULT_PORT, DEFAULT_REDIRECT_TTL};

/// Validated, immutable bundle of connection settings.
#[derive(Debug, Clone)]
pub struct Target {
    pub host: Option<String>,
    pub unix_socket: Option<String>,
    /// -1 means "unset", otherwise 1..=65535.
    pub port: i32,

    pub tls: bool,
    pub cert: Option<String>,
    pub certhash: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,

    pub database: String,
    pub tableschema: String,
    pub table: String,

    pub user: String,
    pub password: String,

    pub language: String,
    pub autocommit: bool,
    pub replysize: i32,
    pub timezone: Option<String>,
    /// Non-negative; `true`/`false` aliases map to 65535/0.
    pub binary: u32,
    /// `None` means "no restriction"; `Some(vec![])` would mean "accept
    /// nothing" and is rejected at `validate`.
    pub hash_algorithms: Option<Vec<String>>,

    pub redirect_ttl: u32,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            host: Some("localhost".to_string()),
            unix_socket: None,
            port: -1,
            tls: false,
            cert: None,
            certhash: None,
            client_cert: None,
            client_key: None,
            database: String::new(),
            tableschema: String::new(),
            table: String::new(),
            user: String::new(),
            password: String::new(),
            language: "sql".to_string(),
            autocommit: true,
            replysize: 100,
            timezone: None,
            binary: 65535,
            hash_algorithms: None,
            redirect_ttl: DEFAULT_REDIRECT_TTL,
        }
    }
}

impl Target {
    /// Parses a MonetDB URL (modern `monetdb[s]://` or classic
    /// `mapi:monetdb://` / `mapi:monetdb:///path/to/socket`) and layers an
    /// overlay map of `key=value` settings on top in a two-stage
    /// construction: parse first, then apply overrides.
    pub fn from_url(raw: &str, overlay: &HashMap<String, String>) -> MapiResult<Target> {
        let parsed = parse_mapi_url(raw)?;
        let scheme = match parsed.scheme {
            UrlScheme::Monetdb { tls } => tls,
            UrlScheme::Merovingian => {
                return Err(MapiError::Config(
                    "mapi:merovingian:// is only valid as a redirect target".into(),
                ))
            }
        };

        let mut target = Target {
            tls: scheme,
            ..Target::default()
        };
        target.apply_parsed(&parsed)?;
        target.apply_overlay_map(overlay)?;
        target.validate()?;
        Ok(target)
    }

    /// Applies a server REDIRECT line on top of this target,
    /// returning either a new target to reconnect to, or a marker meaning
    /// "the same connection continues, do not reconnect" (the merovingian
    /// proxy-forward case).
    pub fn apply_redirect(&self, raw: &str) -> MapiResult<Redirect> {
        let parsed = parse_mapi_url(raw)?;
        match parsed.scheme {
            UrlScheme::Merovingian => Ok(Redirect::ProxyContinue),
            UrlScheme::Monetdb { tls } => {
                let mut next = self.clone();
                next.tls = tls;
                next.apply_parsed(&parsed)?;
                next.validate()?;
                Ok(Redirect::Reconnect(next))
            }
        }
    }

    fn apply_parsed(&mut self, parsed: &ParsedUrl) -> MapiResult<()> {
        if let Some(path) = &parsed.unix_path {
            self.unix_socket = Some(path.clone());
            self.host = None;
        } else {
            if let Some(host) = &parsed.host {
                self.host = Some(host.clone());
            }
            if let Some(port) = parsed.port {
                self.port = port as i32;
            }
        }

        if let Some(db) = parsed.segments.first() {
            self.database = db.clone();
        }
        if let Some(schema) = parsed.segments.get(1) {
            self.tableschema = schema.clone();
        }
        if let Some(table) = parsed.segments.get(2) {
            self.table = table.clone();
        }

        for (key, value) in &parsed.query {
            self.apply_setting(key, value)?;
        }
        Ok(())
    }

    fn apply_overlay_map(&mut self, overlay: &HashMap<String, String>) -> MapiResult<()> {
        for (key, value) in overlay {
            self.apply_setting(key, value)?;
        }
        Ok(())
    }

    fn apply_setting(&mut self, key: &str, value: &str) -> MapiResult<()> {
        match key {
            "host" => self.host = Some(value.to_string()),
            "port" => {
                self.port = value
                    .parse::<i32>()
                    .map_err(|_| MapiError::Config(format!("invalid port {}", value)))?
            }
            "database" => self.database = value.to_string(),
            "tableschema" => self.tableschema = value.to_string(),
            "table" => self.table = value.to_string(),
            "user" => self.user = value.to_string(),
            "password" => self.password = value.to_string(),
            "language" => self.language = value.to_string(),
            "autocommit" => self.autocommit = parse_bool(value)?,
            "replysize" => {
                self.replysize = value
                    .parse::<i32>()
                    .map_err(|_| MapiError::Config(format!("invalid replysize {}", value)))?
            }
            "timezone" => self.timezone = Some(value.to_string()),
            "binary" => self.binary = parse_binary(value)?,
            "cert" => self.cert = Some(value.to_string()),
            "certhash" => self.certhash = Some(value.to_string()),
            "clientcert" => self.client_cert = Some(value.to_string()),
            "clientkey" => self.client_key = Some(value.to_string()),
            "tls" => self.tls = parse_bool(value)?,
            "hash" => {
                self.hash_algorithms = Some(value.split(',').map(|s| s.trim().to_string()).collect())
            }
            "unix_socket" => self.unix_socket = Some(value.to_string()),
            other if other.contains('_') => {
                // Reserved-for-extension namespace: accepted, ignored.
            }
            other => {
                return Err(MapiError::Config(format!("unknown setting {}", other)));
            }
        }
        Ok(())
    }

    /// Checks the target's invariants. Called once after construction;
    /// never called again for the lifetime of a connection attempt.
    pub fn validate(&self) -> MapiResult<()> {
        match (&self.unix_socket, &self.host) {
            (Some(_), Some(_)) => {
                return Err(MapiError::Config(
                    "exactly one of unix-socket path or host must be set, not both".into(),
                ))
            }
            (None, None) => {
                return Err(MapiError::Config(
                    "exactly one of unix-socket path or host must be set".into(),
                ))
            }
            _ => {}
        }

        if self.unix_socket.is_some() && self.tls {
            return Err(MapiError::Config(
                "TLS is incompatible with unix-socket transport".into(),
            ));
        }

        if self.port != -1 && !(1..=65535).contains(&self.port) {
            return Err(MapiError::Config(format!(
                "port must be -1 (unset) or in 1..=65535, got {}",
                self.port
            )));
        }

        if let Some(certhash) = &self.certhash {
            if !is_valid_certhash(certhash) {
                return Err(MapiError::Config(
                    "certhash must be 'sha256:' followed by hex digits and colons".into(),
                ));
            }
        }

        for (field, value) in [
            ("database", &self.database),
            ("tableschema", &self.tableschema),
            ("table", &self.table),
        ] {
            if !value.is_empty() && !is_valid_identifier(value) {
                return Err(MapiError::Config(format!(
                    "{} is not a valid identifier: {}",
                    field, value
                )));
            }
        }

        if !self.table.is_empty() && self.tableschema.is_empty() {
            return Err(MapiError::Config(
                "a non-empty table requires a non-empty tableschema".into(),
            ));
        }
        if !self.tableschema.is_empty() && self.database.is_empty() {
            return Err(MapiError::Config(
                "a non-empty tableschema requires a non-empty database".into(),
            ));
        }

        if self.client_cert.is_some() && self.client_key.is_none() {
            return Err(MapiError::Config(
                "clientcert requires clientkey".into(),
            ));
        }

        Ok(())
    }

    pub fn effective_port(&self) -> u16 {
        if self.port == -1 {
            DEFAULT_PORT
        } else {
            self.port as u16
        }
    }
}

/// Outcome of applying a server REDIRECT line on top of a target.
pub enum Redirect {
    Reconnect(Target),
    ProxyContinue,
}

fn parse_bool(value: &str) -> MapiResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(MapiError::Config(format!("not a boolean: {}", other))),
    }
}

/// `binary` is a non-negative integer, accepting boolean aliases.
fn parse_binary(value: &str) -> MapiResult<u32> {
    if let Ok(b) = parse_bool(value) {
        return Ok(if b { 65535 } else { 0 });
    }
    value
        .parse::<u32>()
        .map_err(|_| MapiError::Config(format!("invalid binary setting {}", value)))
}

fn is_valid_certhash(value: &str) -> bool {
    match value.strip_prefix("sha256:") {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_hexdigit() || c == ':'),
        None => false,
    }
}

fn is_valid_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UrlScheme {
    Monetdb { tls: bool },
    Merovingian,
}

pub(crate) struct ParsedUrl {
    pub scheme: UrlScheme,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub unix_path: Option<String>,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
}

/// Parses both URL families: modern `monetdb[s]://...` and classic
/// `mapi:monetdb://...` / `mapi:merovingian://proxy` / the unix-socket form
/// `mapi:monetdb:///path/to/socket`.
pub(crate) fn parse_mapi_url(raw: &str) -> MapiResult<ParsedUrl> {
    let (classic, remainder) = match raw.strip_prefix("mapi:") {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    let idx = remainder.find("://").ok_or_else(|| {
        MapiError::Config(format!("not a MonetDB URL: {}", raw))
    })?;
    let scheme_name = &remainder[..idx];
    let after_scheme = &remainder[idx + 3..];

    let scheme = match (classic, scheme_name) {
        (false, "monetdb") => UrlScheme::Monetdb { tls: false },
        (false, "monetdbs") => UrlScheme::Monetdb { tls: true },
        (true, "monetdb") => UrlScheme::Monetdb { tls: false },
        (true, "merovingian") => UrlScheme::Merovingian,
        _ => {
            return Err(MapiError::Config(format!(
                "unsupported URL scheme: {}",
                scheme_name
            )))
        }
    };

    let (authpath, query_str) = match after_scheme.find('?') {
        Some(i) => (&after_scheme[..i], &after_scheme[i + 1..]),
        None => (after_scheme, ""),
    };

    let (authority, path_rest) = match authpath.find('/') {
        Some(i) => (&authpath[..i], &authpath[i..]),
        None => (authpath, ""),
    };

    let query: Vec<(String, String)> = url::form_urlencoded::parse(query_str.as_bytes())
        .into_owned()
        .collect();

    if classic && authority.is_empty() && !path_rest.is_empty() {
        // `mapi:monetdb:///path/to/socket` — empty authority, path is the socket path.
        let decoded = percent_decode(&path_rest[1..]);
        return Ok(ParsedUrl {
            scheme,
            host: None,
            port: None,
            unix_path: Some(decoded),
            segments: Vec::new(),
            query,
        });
    }

    let (host, port) = if authority.is_empty() {
        (None, None)
    } else if let Some(colon) = authority.rfind(':') {
        let host = &authority[..colon];
        let port_str = &authority[colon + 1..];
        let port = port_str
            .parse::<u16>()
            .map_err(|_| MapiError::Config(format!("invalid port in URL: {}", port_str)))?;
        (Some(host.to_string()), Some(port))
    } else {
        (Some(authority.to_string()), None)
    };

    let segments: Vec<String> = path_rest
        .split('/')
        .filter(|s| !s.is_empty())
        .map(percent_decode)
        .collect();
    if segments.len() > 3 {
        return Err(MapiError::Config(
            "URL path has more than /database/schema/table".into(),
        ));
    }

    Ok(ParsedUrl {
        scheme,
        host,
        port,
        unix_path: None,
        segments,
        query,
    })
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modern_url_sets_tls_from_scheme() {
        let t = Target::from_url("monetdbs://db.example.com:12345/mydb", &HashMap::new()).unwrap();
        assert!(t.tls);
        assert_eq!(t.host.as_deref(), Some("db.example.com"));
        assert_eq!(t.port, 12345);
        assert_eq!(t.database, "mydb");
    }

    #[test]
    fn modern_url_with_schema_and_table() {
        let t = Target::from_url("monetdb://localhost/mydb/myschema/mytable", &HashMap::new())
            .unwrap();
        assert_eq!(t.database, "mydb");
        assert_eq!(t.tableschema, "myschema");
        assert_eq!(t.table, "mytable");
    }

    #[test]
    fn classic_unix_socket_url() {
        let t = Target::from_url("mapi:monetdb:///tmp/.s.monetdb.50000", &HashMap::new()).unwrap();
        assert_eq!(t.unix_socket.as_deref(), Some("/tmp/.s.monetdb.50000"));
        assert!(t.host.is_none());
    }

    #[test]
    fn tls_with_unix_socket_fails_validation() {
        let mut overlay = HashMap::new();
        overlay.insert("tls".to_string(), "true".to_string());
        let err = Target::from_url("mapi:monetdb:///tmp/sock", &overlay).unwrap_err();
        assert!(matches!(err, MapiError::Config(_)));
    }

    #[test]
    fn unknown_key_without_underscore_is_rejected() {
        let mut overlay = HashMap::new();
        overlay.insert("bogus".to_string(), "1".to_string());
        let err = Target::from_url("monetdb://localhost/db", &overlay).unwrap_err();
        assert!(matches!(err, MapiError::Config(_)));
    }

    #[test]
    fn underscore_key_is_reserved_and_accepted() {
        let mut overlay = HashMap::new();
        overlay.insert("x_vendor_flag".to_string(), "1".to_string());
        let t = Target::from_url("monetdb://localhost/db", &overlay).unwrap();
        assert_eq!(t.database, "db");
    }

    #[test]
    fn table_without_schema_fails_validation() {
        let mut overlay = HashMap::new();
        overlay.insert("table".to_string(), "t".to_string());
        let err = Target::from_url("monetdb://localhost/db", &overlay).unwrap_err();
        assert!(matches!(err, MapiError::Config(_)));
    }

    #[test]
    fn clientcert_without_clientkey_fails_validation() {
        let mut overlay = HashMap::new();
        overlay.insert("clientcert".to_string(), "/tmp/cert.pem".to_string());
        let err = Target::from_url("monetdb://localhost/db", &overlay).unwrap_err();
        assert!(matches!(err, MapiError::Config(_)));
    }

    #[test]
    fn binary_accepts_boolean_aliases() {
        let mut overlay = HashMap::new();
        overlay.insert("binary".to_string(), "false".to_string());
        let t = Target::from_url("monetdb://localhost/db", &overlay).unwrap();
        assert_eq!(t.binary, 0);
    }

    #[test]
    fn certhash_must_start_with_sha256_prefix() {
        let mut overlay = HashMap::new();
        overlay.insert("certhash".to_string(), "md5:abcd".to_string());
        let err = Target::from_url("monetdb://localhost/db", &overlay).unwrap_err();
        assert!(matches!(err, MapiError::Config(_)));
    }

    #[test]
    fn merovingian_redirect_is_proxy_continue() {
        let t = Target::from_url("monetdb://localhost/db", &HashMap::new()).unwrap();
        match t.apply_redirect("mapi:merovingian://proxy").unwrap() {
            Redirect::ProxyContinue => {}
            Redirect::Reconnect(_) => panic!("expected ProxyContinue"),
        }
    }

    #[test]
    fn monetdb_redirect_builds_new_target() {
        let t = Target::from_url("monetdb://localhost/db", &HashMap::new()).unwrap();
        match t.apply_redirect("mapi:monetdb://otherhost:6000/otherdb").unwrap() {
            Redirect::Reconnect(next) => {
                assert_eq!(next.host.as_deref(), Some("otherhost"));
                assert_eq!(next.port, 6000);
                assert_eq!(next.database, "otherdb");
            }
            Redirect::ProxyContinue => panic!("expected Reconnect"),
        }
    }
}
