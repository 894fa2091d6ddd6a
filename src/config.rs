//! Server configuration.
//!
//! The configuration file is line oriented: every line is a `directive value` pair, blank lines
//! and lines starting with `#` are skipped, and directive names are case insensitive. Values
//! containing spaces can be wrapped in double quotes.
//!
//! ```text
//! # store
//! redis-ip 127.0.0.1
//! redis-port 6379
//! redis-page 20
//! # http
//! port 8099
//! num_threads 50
//! worker-pool shared
//! ```
use std::fmt;
use std::fs::{self, OpenOptions};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::{KsError, Result};

/// default HTTP listen port
pub const DEFAULT_PORT: u16 = 8099;
/// default redis server address
pub const DEFAULT_REDIS_IP: &str = "127.0.0.1";
/// default redis server port
pub const DEFAULT_REDIS_PORT: u16 = 6379;
/// default number of entries requested per scan page
pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// default number of worker threads
pub const DEFAULT_THREADS: u32 = 50;

/// The store engine requests are executed against
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineKind {
    /// a redis server at `redis-ip`:`redis-port`
    Redis,
    /// an in-process store, contents are lost on exit
    Memory,
}

/// The thread pool requests are handed to
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PoolKind {
    /// a new thread for every request
    Naive,
    /// a fixed set of threads pulling requests off a shared queue
    Shared,
    /// a rayon work-stealing pool
    Rayon,
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(EngineKind::Redis),
            "memory" => Ok(EngineKind::Memory),
            other => Err(format!("unknown engine '{}', expected 'redis' or 'memory'", other)),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Redis => write!(f, "redis"),
            EngineKind::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for PoolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "naive" => Ok(PoolKind::Naive),
            "shared" => Ok(PoolKind::Shared),
            "rayon" => Ok(PoolKind::Rayon),
            other => Err(format!("unknown worker pool '{}', expected 'naive', 'shared' or 'rayon'", other)),
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Naive => write!(f, "naive"),
            PoolKind::Shared => write!(f, "shared"),
            PoolKind::Rayon => write!(f, "rayon"),
        }
    }
}

/// TLS settings. HTTPS is served when a certificate is configured
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM file holding the server certificate chain
    pub certificate: Option<PathBuf>,
    /// PEM file holding the private key, the certificate file is used when unset
    pub private_key: Option<PathBuf>,
    /// CA file for client verification
    pub ca_file: Option<PathBuf>,
    /// protocol version policy
    pub protocol_version: Option<String>,
    /// allowed cipher list
    pub cipher_list: Option<String>,
}

/// Everything the server needs to start. Built once at startup and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// redis server address
    pub redis_ip: String,
    /// redis server port
    pub redis_port: u16,
    /// the `COUNT` given to every scan
    pub page_size: u64,
    /// address the HTTP server listens on
    pub addr: SocketAddr,
    /// request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// true if asked to run as a daemon
    pub daemonize: bool,
    /// file the process id is written to at startup
    pub pidfile: Option<PathBuf>,
    /// file log output is appended to, stderr when unset
    pub logfile: Option<PathBuf>,
    /// TLS settings
    pub tls: TlsConfig,
    /// the domain being served
    pub auth_domain: Option<String>,
    /// whether the request host is checked against `auth_domain`
    pub auth_domain_check: Option<String>,
    /// number of worker threads
    pub num_threads: u32,
    /// worker threads started before the first request arrives
    pub prespawn_threads: Option<u32>,
    /// connections the OS may queue before they are accepted
    pub listen_backlog: Option<u32>,
    /// accepted connections that may wait for a worker thread
    pub connection_queue: Option<u32>,
    /// which thread pool serves requests
    pub worker_pool: PoolKind,
    /// which store engine requests run against
    pub engine: EngineKind,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            redis_ip: DEFAULT_REDIS_IP.to_string(),
            redis_port: DEFAULT_REDIS_PORT,
            page_size: DEFAULT_PAGE_SIZE,
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            request_timeout_ms: 10_000,
            daemonize: false,
            pidfile: None,
            logfile: None,
            tls: TlsConfig::default(),
            auth_domain: None,
            auth_domain_check: None,
            num_threads: DEFAULT_THREADS,
            prespawn_threads: None,
            listen_backlog: None,
            connection_queue: None,
            worker_pool: PoolKind::Shared,
            engine: EngineKind::Redis,
        }
    }
}

impl Config {
    /// loads a configuration file, starting from the defaults
    ///
    /// # Errors
    /// returns [`KsError::Io`] if the file can not be read and [`KsError::Config`] for the first
    /// directive that is rejected
    pub fn load(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        contents.parse()
    }

    fn apply(&mut self, name: &str, value: &str) -> std::result::Result<(), String> {
        match name {
            "redis-ip" => self.redis_ip = value.to_string(),
            "redis-port" => self.redis_port = value.parse().map_err(|_| "Invalid port".to_string())?,
            "redis-page" => {
                self.page_size = value
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| "page size must be a positive integer".to_string())?
            }
            "port" => {
                let port = value.parse().map_err(|_| "Invalid port".to_string())?;
                self.addr.set_port(port);
            }
            "request_timeout_ms" => self.request_timeout_ms = parse_number(value)?,
            "daemonize" => self.daemonize = yes_no(value)?,
            "pidfile" => self.pidfile = non_empty(value).map(PathBuf::from),
            "logfile" => {
                self.logfile = non_empty(value).map(PathBuf::from);
                if let Some(path) = &self.logfile {
                    check_logfile(path).map_err(|e| format!("Can't open the log file: {}", e))?;
                }
            }
            "auth_domain" => self.auth_domain = non_empty(value).map(String::from),
            "auth_domain_check" => self.auth_domain_check = non_empty(value).map(String::from),
            "ssl_certificate" => self.tls.certificate = non_empty(value).map(PathBuf::from),
            "ssl_private_key" => self.tls.private_key = non_empty(value).map(PathBuf::from),
            "ssl_ca_file" => self.tls.ca_file = non_empty(value).map(PathBuf::from),
            "ssl_protocol_version" => self.tls.protocol_version = non_empty(value).map(String::from),
            "ssl_cipher_list" => self.tls.cipher_list = non_empty(value).map(String::from),
            "num_threads" => {
                self.num_threads = parse_number::<u32>(value)?;
                if self.num_threads == 0 {
                    return Err("num_threads must be at least 1".to_string());
                }
            }
            "prespawn_threads" => self.prespawn_threads = Some(parse_number(value)?),
            "listen_backlog" => self.listen_backlog = Some(parse_number(value)?),
            "connection_queue" => self.connection_queue = Some(parse_number(value)?),
            "worker-pool" => self.worker_pool = value.parse()?,
            "engine" => self.engine = value.parse()?,
            _ => return Err("Bad directive or wrong number of arguments".to_string()),
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = KsError;

    fn from_str(contents: &str) -> Result<Config> {
        let mut config = Config::default();

        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fail = |msg: String| KsError::Config { line: i + 1, text: line.to_string(), msg };

            let argv = split_args(line).ok_or_else(|| fail("Unbalanced quotes in configuration line".to_string()))?;
            match argv.as_slice() {
                [] => continue,
                [name, value] => config.apply(&name.to_ascii_lowercase(), value).map_err(fail)?,
                _ => return Err(fail("Bad directive or wrong number of arguments".to_string())),
            }
            debug!(line = i + 1, directive = %argv[0], "config directive applied");
        }
        Ok(config)
    }
}

/// splits a line into whitespace separated arguments, honouring double quotes.
/// Returns `None` if a quote is left open
fn split_args(line: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_arg = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_quotes {
        return None;
    }
    if in_arg {
        args.push(current);
    }
    Some(args)
}

fn yes_no(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err("argument must be 'yes' or 'no'".to_string()),
    }
}

fn parse_number<T: FromStr>(value: &str) -> std::result::Result<T, String> {
    value.parse().map_err(|_| format!("'{}' is not a valid number", value))
}

/// checks that the log file could be opened for appending, without creating it
fn check_logfile(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        return OpenOptions::new().append(true).open(path).map(drop);
    }
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if fs::metadata(parent)?.is_dir() {
        Ok(())
    } else {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"))
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
