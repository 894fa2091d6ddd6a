//! this binary starts the kserver HTTP gateway
//! to see the list of options, type: `kserver --help`
//!
//! Settings are read from the configuration file given with `--config`, if any, and then
//! overridden by the command line options.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::exit;
use std::sync::Mutex;

use clap::{crate_version, value_t, App, Arg, ArgMatches};
use kserver::{
    bind, Config, EngineKind, Executor, Gateway, GatewayServer, KsError, MemoryEngine, NaiveThreadPool, PoolKind,
    RayonThreadPool, RedisEngine, Result, SharedQueueThreadPool, StoreEngine, ThreadPool,
};
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    let matches = App::new("kserver")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a JSON over HTTP gateway onto a redis hash store")
        .arg(Arg::with_name("config")
            .short("c")
            .long("config")
            .value_name("FILE")
            .takes_value(true)
            .help("reads settings from a configuration file"))
        .arg(Arg::with_name("addr")
            .long("addr")
            .value_name("IP_ADDR:PORT")
            .takes_value(true)
            .help("sets the IP_ADDR:PORT that the server listens on"))
        .arg(Arg::with_name("engine")
            .long("engine")
            .value_name("ENGINE_NAME")
            .takes_value(true)
            .possible_values(&["redis", "memory"])
            .help("sets the store engine to use, either 'redis' or 'memory'"))
        .arg(Arg::with_name("pool")
            .long("pool")
            .value_name("POOL")
            .takes_value(true)
            .possible_values(&["naive", "shared", "rayon"])
            .help("sets the worker pool requests are served on"))
        .arg(Arg::with_name("threads")
            .long("threads")
            .value_name("N")
            .takes_value(true)
            .help("sets the number of worker threads"))
        .get_matches();

    let config = match build_config(&matches) {
        Ok(config) => config,
        Err(KsError::Config { line, text, msg }) => {
            eprintln!("\n*** FATAL CONFIG FILE ERROR ***");
            eprintln!("Reading the configuration file, at line {}", line);
            eprintln!(">>> '{}'", text);
            eprintln!("{}", msg);
            exit(1);
        }
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    if let Err(e) = subscriber_config(config.logfile.as_deref()) {
        eprintln!("could not set up logging: {}", e);
        exit(1);
    }

    // start the server
    if let Err(e) = run(config) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// loads the configuration file, if one was given, then applies command line overrides
fn build_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.value_of("config") {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };

    if let Some(addr) = matches.value_of("addr") {
        config.addr = addr
            .parse()
            .map_err(|_| KsError::Parsing(format!("could not parse {} into an IP address and port", addr)))?;
    }
    if matches.is_present("engine") {
        config.engine = value_t!(matches, "engine", EngineKind).map_err(|e| KsError::Parsing(e.message))?;
    }
    if matches.is_present("pool") {
        config.worker_pool = value_t!(matches, "pool", PoolKind).map_err(|e| KsError::Parsing(e.message))?;
    }
    if matches.is_present("threads") {
        config.num_threads = value_t!(matches, "threads", u32).map_err(|e| KsError::Parsing(e.message))?;
        if config.num_threads == 0 {
            return Err(KsError::Parsing("--threads must be at least 1".to_string()));
        }
    }
    Ok(config)
}

fn run(config: Config) -> Result<()> {
    info!("kserver {}", env!("CARGO_PKG_VERSION"));
    info!("Store engine: {}", config.engine);
    info!("Worker pool: {} ({} threads)", config.worker_pool, config.num_threads);
    info!(?config, "configuration");

    if config.daemonize {
        warn!("daemonize is set but kserver always runs in the foreground, use a process supervisor");
    }
    if let Some(pidfile) = &config.pidfile {
        fs::write(pidfile, format!("{}\n", std::process::id()))?;
    }

    match config.engine {
        EngineKind::Redis => {
            info!("Store: {}:{}", config.redis_ip, config.redis_port);
            run_with_engine(RedisEngine::new(&config.redis_ip, config.redis_port)?, &config)
        }
        EngineKind::Memory => run_with_engine(MemoryEngine::new(), &config),
    }
}

fn run_with_engine<E: StoreEngine>(engine: E, config: &Config) -> Result<()> {
    let threads = config.num_threads;
    match config.worker_pool {
        PoolKind::Naive => run_with(engine, NaiveThreadPool::new(threads)?, config),
        PoolKind::Shared => run_with(engine, SharedQueueThreadPool::new(threads)?, config),
        PoolKind::Rayon => run_with(engine, RayonThreadPool::new(threads)?, config),
    }
}

fn run_with<E: StoreEngine, P: ThreadPool>(engine: E, pool: P, config: &Config) -> Result<()> {
    let gateway = Gateway::new(Executor::new(engine, config.page_size));
    let listener = bind(config.addr, &config.tls)?;
    let scheme = if config.tls.certificate.is_some() { "https" } else { "http" };
    info!("Listening on {}://{}", scheme, config.addr);

    GatewayServer::new(gateway, pool).run(listener)
}

/// configures a tracing subscriber that will log to the configured logfile, or to STDERR.
/// The level is taken from `RUST_LOG` and defaults to `info`
fn subscriber_config(logfile: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = match logfile {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(logfile.is_none())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| KsError::StringErr(format!("setting tracing default subscriber failed: {}", e)))
}
