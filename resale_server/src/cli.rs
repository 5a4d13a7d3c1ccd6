use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "RSL_HOST",
        "RSL_PORT",
        "RSL_DATABASE_URL",
        "RSL_SIGNATURE_HEADER",
        "RSL_API_KEY_HEADER",
        "RSL_ORDER_CODE_PATTERN",
        "RSL_UTC_OFFSET_HOURS",
        "RSL_MAINTENANCE_AT",
        "RSL_NOTICES_AT",
        "RSL_SCHEDULER_TICK_SECS",
        "RSL_DISABLE_SCHEDULER",
        "RSL_BACKUP_DIR",
        "RSL_NOTIFIER_URL",
        "RSL_RETRY_RESCAN_DAYS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
