use anyhow::Result;
use clap::Parser;
use conduit::backend::backend_main;
use conduit::frontend::frontend_main;
use conduit::middleware::middleware_main;
use conduit::probe::probe_main;

/// Mode selector: the front end re-execs its own binary with
/// `CONDUIT_MODE` set to spawn its three children, so there is exactly
/// one binary to build and install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Frontend,
    Probe,
    Middleware,
    Backend,
}

#[derive(Parser, Debug)]
#[clap(author, version = git_version::git_version!(fallback = "0.1.0"), about)]
struct Args {
    /// Which component to run. Defaults to the front end, the only mode a
    /// user invokes directly; the others are normally spawned by it.
    #[clap(long, value_enum)]
    mode: Option<Mode>,

    /// Run this component detached from the controlling terminal
    /// (ignored in `frontend` mode, which must own the terminal).
    #[clap(long)]
    daemonize: bool,

    /// 0, 1, or 2.
    #[clap(long, default_value = "0")]
    verbosity: u8,
}

fn resolved_mode(args: &Args) -> Mode {
    if let Some(mode) = args.mode {
        return mode;
    }
    match std::env::var("CONDUIT_MODE").as_deref() {
        Ok("probe") => Mode::Probe,
        Ok("middleware") => Mode::Middleware,
        Ok("backend") => Mode::Backend,
        _ => Mode::Frontend,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mode = resolved_mode(&args);

    match mode {
        Mode::Probe => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("unable to construct tokio runtime");
            let _guard = conduit::util::register_tracing("probe", args.daemonize, args.verbosity)?;
            rt.block_on(probe_main(args.daemonize))
        }
        Mode::Middleware => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("unable to construct tokio runtime");
            let _guard =
                conduit::util::register_tracing("middleware", args.daemonize, args.verbosity)?;
            rt.block_on(middleware_main(args.daemonize))
        }
        Mode::Backend => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("unable to construct tokio runtime");
            let _guard =
                conduit::util::register_tracing("backend", args.daemonize, args.verbosity)?;
            rt.block_on(backend_main(args.daemonize, args.verbosity))
        }
        Mode::Frontend => {
            // The front end is a synchronous REPL; it builds its own
            // small multi-thread runtime only to drive the socket and
            // child-process I/O its blocking loop delegates into.
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("unable to construct tokio runtime");
            let _guard =
                conduit::util::register_tracing("frontend", false, args.verbosity)?;
            rt.block_on(frontend_main())
        }
    }
}
