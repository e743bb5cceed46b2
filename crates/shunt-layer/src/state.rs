//! Process-wide layer state, filled in once by the load-time constructor.

use once_cell::sync::OnceCell;
use shunt_config::Config;
use shunt_core::accounting::use_color;
use shunt_core::{AccountingContext, Redirector};
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) static ACCOUNTING: AccountingContext = AccountingContext::new();

static REDIRECTOR: OnceCell<Redirector> = OnceCell::new();
static REPORT: AtomicBool = AtomicBool::new(true);
static REPORT_COLOR: AtomicBool = AtomicBool::new(false);

/// Apply `config` to both policies. Hooks running before this see the
/// defaults: accounting on, no redirection.
pub(crate) fn install(config: &Config) -> Option<&'static Redirector> {
    ACCOUNTING.configure(&config.accounting);
    REPORT.store(
        config.accounting.enabled && config.accounting.report,
        Ordering::Relaxed,
    );
    let tty = unsafe { libc::isatty(libc::STDERR_FILENO) } == 1;
    REPORT_COLOR.store(use_color(config.accounting.color, tty), Ordering::Relaxed);

    if config.redirect.rules.is_empty() {
        return None;
    }
    Some(REDIRECTOR.get_or_init(|| Redirector::from_config(&config.redirect)))
}

/// `None` until a rule set is installed.
#[inline]
pub(crate) fn redirector() -> Option<&'static Redirector> {
    REDIRECTOR.get()
}

pub(crate) fn report_enabled() -> bool {
    REPORT.load(Ordering::Relaxed)
}

pub(crate) fn report_color() -> bool {
    REPORT_COLOR.load(Ordering::Relaxed)
}
