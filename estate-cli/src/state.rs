use anyhow::{Context, Result};
use estate_core::Session;
use std::fs;
use std::path::PathBuf;

pub fn estate_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".estate"))
}

pub fn ensure_estate_home() -> Result<PathBuf> {
    let dir = estate_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn session_path() -> Result<PathBuf> {
    Ok(ensure_estate_home()?.join("session.json"))
}

pub fn write_session(session: &Session) -> Result<()> {
    let p = session_path()?;
    let json = serde_json::to_string_pretty(session)?;
    fs::write(&p, json).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

/// The signed-in session, if any.
pub fn read_session() -> Result<Option<Session>> {
    let p = session_path()?;
    if !p.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    Ok(Some(
        serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))?,
    ))
}

/// Returns `true` if a session was removed.
pub fn clear_session() -> Result<bool> {
    let p = session_path()?;
    if !p.exists() {
        return Ok(false);
    }
    fs::remove_file(&p).with_context(|| format!("remove {}", p.display()))?;
    Ok(true)
}
