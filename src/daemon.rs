//! Background process management for `server start|stop|status`.
//!
//! The running server's PID lives in a file under the platform data directory;
//! liveness is checked against the process table with `sysinfo`.

use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use sysinfo::{Pid, System};

#[cfg(unix)]
use daemonize::Daemonize;

/// Where the background server records its PID.
pub fn pid_path() -> Result<PathBuf> {
    let project_dirs = crate::config::project_dirs()?;
    let data_dir = project_dirs.data_local_dir();
    fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("server.pid"))
}

fn read_pid(pid_file: &Path) -> Result<Option<u32>> {
    if !pid_file.exists() {
        return Ok(None);
    }
    let pid_str = fs::read_to_string(pid_file)?;
    let pid = pid_str
        .trim()
        .parse()
        .with_context(|| format!("PID file {} is corrupt", pid_file.display()))?;
    Ok(Some(pid))
}

fn process_alive(pid: u32) -> bool {
    let s = System::new_all();
    s.process(Pid::from_u32(pid)).is_some()
}

/// PID of the background server, if it is still alive.
pub fn running_pid() -> Result<Option<u32>> {
    Ok(read_pid(&pid_path()?)?.filter(|pid| process_alive(*pid)))
}

/// Extra arguments forwarded to the relaunched `server run`, e.g. `--config`.
fn run_args(config_path: Option<&Path>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(path) = config_path {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    args.push("server".to_string());
    args.push("run".to_string());
    args
}

/// Starts the server as a background process using platform-specific logic.
pub fn start(config_path: Option<&Path>) -> Result<()> {
    if let Some(pid) = running_pid()? {
        println!("Server is already running with PID {}.", pid);
        return Ok(());
    }

    let pid_file = pid_path()?;
    let myself = env::current_exe()?;
    let args = run_args(config_path);
    println!("Starting server in the background...");
    spawn_background(&pid_file, &myself, &args)
}

#[cfg(unix)]
fn spawn_background(pid_file: &Path, myself: &Path, args: &[String]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    println!("PID file at: {}", pid_file.display());
    // The daemonized process records its PID, then execs the foreground
    // server in place so that PID stays valid for `stop`.
    Daemonize::new()
        .pid_file(pid_file)
        .working_directory(env::current_dir()?)
        .start()
        .context("failed to daemonize")?;
    let err = Command::new(myself).args(args).exec();
    Err(err).context("failed to exec server process")
}

#[cfg(windows)]
fn spawn_background(pid_file: &Path, myself: &Path, args: &[String]) -> Result<()> {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    let child = Command::new(myself).args(args).creation_flags(CREATE_NO_WINDOW).spawn()?;
    fs::write(pid_file, child.id().to_string())?;
    println!("Server started successfully. PID file at: {}", pid_file.display());
    Ok(())
}

/// Stops the background server process.
pub fn stop() -> Result<()> {
    let pid_file = pid_path()?;
    let Some(pid) = read_pid(&pid_file)? else {
        println!("Server is not running (no PID file).");
        return Ok(());
    };

    let s = System::new_all();
    if let Some(process) = s.process(Pid::from_u32(pid)) {
        println!("Stopping server process with PID: {}", pid);
        process.kill();
    } else {
        println!("Process with PID {} not found. It may have already stopped.", pid);
    }
    fs::remove_file(&pid_file)?;
    println!("Server stopped.");
    Ok(())
}

pub fn status() -> Result<()> {
    match running_pid()? {
        Some(pid) => println!("Server is running with PID: {}", pid),
        None => println!("Server is not running."),
    }
    Ok(())
}
