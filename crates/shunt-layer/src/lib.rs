//! # shunt-layer
//!
//! The preloadable library. Load it with `LD_PRELOAD` (Linux) or
//! `DYLD_INSERT_LIBRARIES` (macOS) and every call the host makes to the
//! intercepted libc functions runs through shunt first:
//!
//! - `malloc`, `calloc`, `realloc`, `free`: allocation accounting, with a
//!   report on stderr at `exit`
//! - `open`, `fopen`, `read`, `fread`, `close`, `fclose`: file redirection
//!
//! On Linux the replacements are exported under the public names and find
//! the originals with `dlsym(RTLD_NEXT)`. On macOS they are registered in
//! the `__DATA,__interpose` table and dyld binds the originals.
//!
//! ## Constraints inside hooks
//!
//! Hook bodies run inside the host's allocator and I/O calls. They must not
//! allocate outside the re-entered path, must not panic (the crate is built
//! with `panic = "abort"`), and log only through `shunt_core::hook_*!`.

#![allow(clippy::missing_safety_doc)]

// Macros must be defined before modules that use them
#[macro_use]
mod macros;

pub mod alloc;
pub mod io;
mod state;

use shunt_config::logging::init_logging;
use shunt_config::{log_layer_info, log_layer_warn, Config};
use shunt_core::hook::{prepare_all, Intercept};
use shunt_core::log::{self as hook_log, StackWriter};
use shunt_core::{BindError, HookGuard, Registrar};

/// Every hook the layer installs, resolved eagerly at load time.
static HOOKS: &[&dyn Intercept] = &[
    &alloc::MALLOC,
    &alloc::CALLOC,
    &alloc::REALLOC,
    &alloc::FREE,
    &alloc::EXIT,
    &io::OPEN,
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    &io::OPEN64,
    &io::FOPEN,
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    &io::FOPEN64,
    &io::READ,
    &io::FREAD,
    &io::CLOSE,
    &io::FCLOSE,
];

/// Called when the library is loaded
#[used]
#[cfg_attr(target_os = "linux", link_section = ".init_array")]
#[cfg_attr(target_vendor = "apple", link_section = "__DATA,__mod_init_func")]
static INIT: extern "C" fn() = {
    extern "C" fn init() {
        // Everything below runs as a re-entered hook: forwarded, unaccounted.
        let _guard = HookGuard::enter();
        initialize();
    }
    init
};

fn initialize() {
    if !HookGuard::init() {
        // Without the key every hook forwards; the host still runs.
        hook_log::write_stderr(b"shunt: recursion guard unavailable, hooks disabled\n");
    }

    if let Err(BindError::NotFound { symbol }) = prepare_all(HOOKS) {
        report_load_error(format_args!("cannot resolve original symbol `{symbol}`, aborting"));
        hook_log::LOGGER.dump();
        std::process::abort();
    }

    let (config, load_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => {
            report_load_error(format_args!("ignoring configuration: {e}"));
            (Config::default(), Some(e))
        }
    };

    hook_log::set_level(config.log.level);
    hook_log::set_debug(config.log.debug);
    if config.log.tracing {
        init_logging(config.log.level);
    }
    if let Some(e) = load_error {
        log_layer_warn!("running with default configuration", error = %e);
    }

    let rules = state::install(&config).map_or(0, |r| r.rules().len());

    log_layer_info!(
        "shunt layer loaded",
        strategy = ?shunt_core::ActiveRegistrar::STRATEGY,
        hooks = HOOKS.len(),
        rules = rules,
        accounting = config.accounting.enabled
    );
}

fn report_load_error(args: std::fmt::Arguments<'_>) {
    use std::fmt::Write as _;
    let mut buf = [0u8; 512];
    let mut out = StackWriter::new(&mut buf);
    let _ = writeln!(out, "shunt: {args}");
    hook_log::write_stderr(out.as_bytes());
}
