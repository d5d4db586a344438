//! The challenge/response handshake state machine: redirects, hash
//! negotiation, in-handshake options, and the merovingian proxy special
//! case.

use std::net::TcpStream;
use std::time::Duration;

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::consts::SUPPORTED_PROTOCOL_VERSION;
use crate::debug::{DebugSink, DebugTag};
use crate::framer::{BlockFramer, Transport};
use crate::hash::{choose_hash_algo, compute_response_hash};
use crate::line::LineType;
use crate::reader::LineReader;
use crate::target::{Redirect, Target};
use crate::tls;

/// One parsed `options_spec` entry: `<language>=<level>`.
#[derive(Debug, Clone)]
pub struct OptionLevel {
    pub language: String,
    pub level: i32,
}

/// Receives the announced option levels and contributes `name=value` pairs
/// for any option whose level is strictly less than what was announced.
/// The default callback contributes nothing.
pub trait OptionsCallback {
    fn contribute(&mut self, levels: &[OptionLevel]) -> Vec<(String, i32)>;
}

pub struct NoOptions;
impl OptionsCallback for NoOptions {
    fn contribute(&mut self, _levels: &[OptionLevel]) -> Vec<(String, i32)> {
        Vec::new()
    }
}

/// The server's parsed challenge line.
#[derive(Debug, Clone)]
struct Challenge {
    salt: String,
    server_kind: String,
    version: String,
    supported_hashes: Vec<String>,
    password_hash_algo: String,
    options_spec: Option<String>,
}

fn parse_challenge(line: &[u8]) -> MapiResult<Challenge> {
    let text = std::str::from_utf8(line)?;
    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() < 6 {
        return Err(MapiError::Protocol(format!(
            "challenge has {} fields, need at least 6",
            fields.len()
        )));
    }
    if fields[2] != SUPPORTED_PROTOCOL_VERSION {
        return Err(MapiError::Auth(format!(
            "unsupported protocol version {}",
            fields[2]
        )));
    }
    Ok(Challenge {
        salt: fields[0].to_string(),
        server_kind: fields[1].to_string(),
        version: fields[2].to_string(),
        supported_hashes: fields[3].split(',').map(|s| s.to_string()).collect(),
        password_hash_algo: fields[5].to_string(),
        options_spec: fields.get(6).map(|s| s.to_string()),
    })
}

fn parse_option_levels(spec: &str) -> Vec<OptionLevel> {
    spec.split(',')
        .filter_map(|pair| {
            let (language, level) = pair.split_once('=')?;
            let level = level.trim().parse::<i32>().ok()?;
            Some(OptionLevel {
                language: language.trim().to_string(),
                level,
            })
        })
        .collect()
}

/// A successfully established session: the reader/framer pair plus any
/// accumulated warnings, ready to drive the command pipeline.
pub struct Established {
    pub reader: LineReader<Transport>,
    pub warnings: Vec<String>,
    pub server_kind: String,
}

/// Runs the full handshake, including the redirect loop, against `target`.
/// Opens its own TCP connection (and TLS layer, if configured) per attempt.
/// `sink`, when given, observes the raw and decoded traffic of every
/// attempt, redirects included.
pub fn connect(
    target: &Target,
    options: &mut dyn OptionsCallback,
    mut sink: Option<&mut dyn DebugSink>,
) -> MapiResult<Established> {
    let mut current = target.clone();
    let mut ttl = target.redirect_ttl;
    let mut warnings = Vec::new();

    let mut reader = open_reader(&current)?;

    loop {
        let outcome = attempt(&current, &mut reader, options, &mut warnings, sink.as_deref_mut())?;
        match outcome {
            AttemptOutcome::Established { server_kind } => {
                return Ok(Established {
                    reader,
                    warnings,
                    server_kind,
                })
            }
            AttemptOutcome::Redirect(raw) => {
                consume_ttl(&mut ttl)?;
                match current.apply_redirect(&raw)? {
                    Redirect::ProxyContinue => {
                        reader.reset_kind();
                        continue;
                    }
                    Redirect::Reconnect(next) => {
                        let _ = reader.close();
                        current = next;
                        reader = open_reader(&current)?;
                        continue;
                    }
                }
            }
        }
    }
}

/// Decrements the redirect TTL budget, failing once it would go negative.
/// Both `mapi:monetdb://…` reconnects and `mapi:merovingian://proxy`
/// continuations consume one slot each.
fn consume_ttl(ttl: &mut u32) -> MapiResult<()> {
    if *ttl == 0 {
        return Err(MapiError::RedirectExhausted);
    }
    *ttl -= 1;
    Ok(())
}

enum AttemptOutcome {
    Established { server_kind: String },
    Redirect(String),
}

fn open_reader(target: &Target) -> MapiResult<LineReader<Transport>> {
    if let Some(path) = &target.unix_socket {
        return Ok(LineReader::new(BlockFramer::new(open_unix(path)?)));
    }

    let host = target
        .host
        .clone()
        .ok_or_else(|| MapiError::Config("target has neither host nor unix-socket path".into()))?;
    let port = target.effective_port();

    let stream = TcpStream::connect((host.as_str(), port))?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;

    let transport = if target.tls {
        let mode = tls::TrustMode::from_target(target)?;
        let client_cert = match (&target.client_cert, &target.client_key) {
            (Some(c), Some(k)) => Some((c.as_str(), k.as_str())),
            _ => None,
        };
        let tls_stream = tls::wrap(stream, &host, &mode, client_cert)?;
        Transport::Tls(Box::new(tls_stream))
    } else {
        use std::io::Write;
        let mut plain = stream;
        // Eight NUL bytes before reading anything: a harmless no-op for a
        // plain-MAPI server, but it forces a fast failure if the server on
        // the other end actually expects a TLS ClientHello.
        plain.write_all(&[0u8; 8])?;
        Transport::Tcp(plain)
    };

    Ok(LineReader::new(BlockFramer::new(transport)))
}

#[cfg(unix)]
fn open_unix(path: &str) -> MapiResult<Transport> {
    use std::io::Write;
    let mut stream = std::os::unix::net::UnixStream::connect(path)?;
    // Unix-socket transport is never TLS-wrapped (validate() rejects the
    // combination), but still speaks the same 8-NUL preface as plain TCP.
    stream.write_all(&[0u8; 8])?;
    Ok(Transport::Unix(stream))
}

#[cfg(not(unix))]
fn open_unix(_path: &str) -> MapiResult<Transport> {
    Err(MapiError::Config(
        "unix-domain socket transport is only available on unix platforms".into(),
    ))
}

fn attempt(
    target: &Target,
    reader: &mut LineReader<Transport>,
    options: &mut dyn OptionsCallback,
    warnings: &mut Vec<String>,
    mut sink: Option<&mut dyn DebugSink>,
) -> MapiResult<AttemptOutcome> {
    reader.advance_with_sink(sink.as_deref_mut())?;
    let challenge_line = reader.line().to_vec();
    let challenge = parse_challenge(&challenge_line)?;
    reader.advance_with_sink(sink.as_deref_mut())?; // trailing PROMPT
    reader.reset_kind();

    let chosen = choose_hash_algo(&challenge.supported_hashes, target.hash_algorithms.as_deref())?;

    let (mut user, mut password) = (target.user.clone(), target.password.clone());
    if challenge.server_kind == "merovingian" && target.language != "control" {
        user = "merovingian".to_string();
        password = "merovingian".to_string();
    }

    let resp = compute_response_hash(&password, &challenge.password_hash_algo, chosen, &challenge.salt)?;

    let option_str = match &challenge.options_spec {
        Some(spec) => {
            let levels = parse_option_levels(spec);
            options
                .contribute(&levels)
                .into_iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join(",")
        }
        None => String::new(),
    };

    let response_line = format!(
        "BIG:{user}:{{{algo}}}{resp}:{lang}:{db}:FILETRANSFER:{opts}:",
        user = user,
        algo = chosen.mapi_name(),
        resp = resp,
        lang = target.language,
        db = target.database,
        opts = option_str,
    );

    {
        if let Some(s) = sink.as_deref_mut() {
            s.on_line(DebugTag::Td, response_line.as_bytes(), 0);
        }
        let framer = reader.framer_mut();
        framer.write_with_sink(response_line.as_bytes(), sink.as_deref_mut())?;
        framer.flush()?;
    }

    let mut errors = Vec::new();
    let mut redirect: Option<String> = None;
    loop {
        reader.advance_with_sink(sink.as_deref_mut())?;
        match reader.kind() {
            LineType::Prompt => break,
            LineType::Error => {
                errors.push(String::from_utf8_lossy(reader.line()).into_owned());
            }
            LineType::Info => {
                warnings.push(String::from_utf8_lossy(reader.line()).into_owned());
            }
            LineType::Redirect => {
                if redirect.is_none() {
                    let text = String::from_utf8_lossy(reader.line()).into_owned();
                    redirect = Some(text.trim_start_matches('^').to_string());
                }
            }
            _ => {}
        }
    }

    if !errors.is_empty() {
        return Err(MapiError::Auth(errors.join("\n")));
    }
    if let Some(raw) = redirect {
        return Ok(AttemptOutcome::Redirect(raw));
    }

    reader.reset_kind();
    Ok(AttemptOutcome::Established {
        server_kind: challenge.server_kind,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_challenge() {
        let c = parse_challenge(b"saltvalue:mserver:9:SHA256,SHA1:BIG:SHA1").unwrap();
        assert_eq!(c.salt, "saltvalue");
        assert_eq!(c.server_kind, "mserver");
        assert_eq!(c.supported_hashes, vec!["SHA256", "SHA1"]);
        assert_eq!(c.password_hash_algo, "SHA1");
        assert!(c.options_spec.is_none());
    }

    #[test]
    fn rejects_short_challenge() {
        let err = parse_challenge(b"salt:kind:9").unwrap_err();
        assert!(matches!(err, MapiError::Protocol(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = parse_challenge(b"salt:kind:8:SHA256:BIG:SHA1").unwrap_err();
        assert!(matches!(err, MapiError::Auth(_)));
    }

    #[test]
    fn parses_option_spec_levels() {
        let levels = parse_option_levels("sql=1,mal=2");
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].language, "sql");
        assert_eq!(levels[0].level, 1);
        assert_eq!(levels[1].level, 2);
    }

    #[test]
    fn no_options_callback_contributes_nothing() {
        let mut cb = NoOptions;
        assert!(cb.contribute(&[OptionLevel { language: "sql".into(), level: 1 }]).is_empty());
    }

    #[test]
    fn ttl_exhausts_after_exactly_n_redirects() {
        let mut ttl = 2u32;
        assert!(consume_ttl(&mut ttl).is_ok());
        assert!(consume_ttl(&mut ttl).is_ok());
        let err = consume_ttl(&mut ttl).unwrap_err();
        assert!(matches!(err, MapiError::RedirectExhausted));
    }
}
