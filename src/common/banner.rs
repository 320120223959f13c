use crate::log_println;

const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub struct BannerInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub commit_short: &'static str,
    pub build_time: &'static str,
    pub profile: &'static str,
}

impl Default for BannerInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit_short: env_or!("GIT_COMMIT_SHORT", "unknown"),
            build_time: env_or!("BUILD_TIME", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

pub fn print_banner(role: &str, info: &BannerInfo) {
    log_println!();
    log_println!("{GREEN}{BOLD}  framelink{RESET} {DIM}{role}{RESET}");
    log_println!("{DIM}========================================{RESET}");
    print_row("Version", info.version, CYAN);
    print_row("Branch", info.branch, RESET);
    print_row("Commit", info.commit_short, RESET);
    print_row("Built (unix)", info.build_time, RESET);
    print_row("Profile", info.profile, YELLOW);
    log_println!();
}

fn print_row(label: &str, value: &str, color: &str) {
    log_println!("  {BOLD}{label:<14}{RESET}{color}{value}{RESET}");
}
