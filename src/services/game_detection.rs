//! Game identification from parsed crash logs.
//!
//! The game comes from the header's game-version line
//! (`Fallout 4 v1.10.163`, `Skyrim SE v1.6.1170`, ...). Logs without one fall
//! back to the script extender named in the log body, which tells Fallout 4
//! from Skyrim but not the VR editions.

use crate::crash_log::{CrashLog, XseFlavor};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Game {
    Fallout4,
    Fallout4Vr,
    SkyrimSe,
    SkyrimVr,
}

impl Game {
    /// Identify the game from a game-version line
    pub fn from_version(version: &str) -> Option<Self> {
        let lowered = version.to_lowercase();

        // VR editions first: their names contain the flat-screen names
        let game_map = [
            ("fallout 4 vr", Game::Fallout4Vr),
            ("fallout4vr", Game::Fallout4Vr),
            ("fallout 4", Game::Fallout4),
            ("fallout4", Game::Fallout4),
            ("skyrim vr", Game::SkyrimVr),
            ("skyrimvr", Game::SkyrimVr),
            ("skyrim", Game::SkyrimSe),
        ];

        game_map
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern))
            .map(|(_, game)| *game)
    }

    pub fn from_crash_log(log: &CrashLog) -> Option<Self> {
        if let Some(game) = log.game_version.as_deref().and_then(Self::from_version) {
            tracing::debug!("Detected {} from game version in {}", game, log.file_name());
            return Some(game);
        }

        if log.original_lines.is_empty() {
            tracing::debug!("Could not detect game for {}", log.file_name());
            return None;
        }

        let game = match XseFlavor::detect(&log.original_lines) {
            XseFlavor::Skse => Game::SkyrimSe,
            XseFlavor::F4se => Game::Fallout4,
        };
        tracing::debug!("Detected {} from script extender in {}", game, log.file_name());
        Some(game)
    }

    pub fn xse_flavor(self) -> XseFlavor {
        match self {
            Game::Fallout4 | Game::Fallout4Vr => XseFlavor::F4se,
            Game::SkyrimSe | Game::SkyrimVr => XseFlavor::Skse,
        }
    }

    pub fn is_vr(self) -> bool {
        matches!(self, Game::Fallout4Vr | Game::SkyrimVr)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Game::Fallout4 => "Fallout 4",
            Game::Fallout4Vr => "Fallout 4 VR",
            Game::SkyrimSe => "Skyrim Special Edition",
            Game::SkyrimVr => "Skyrim VR",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_version() {
        assert_eq!(Game::from_version("Fallout 4 v1.10.163"), Some(Game::Fallout4));
        assert_eq!(Game::from_version("Fallout 4 VR v1.2.72"), Some(Game::Fallout4Vr));
        assert_eq!(Game::from_version("Skyrim SE v1.6.1170"), Some(Game::SkyrimSe));
        assert_eq!(Game::from_version("Skyrim VR v1.4.15"), Some(Game::SkyrimVr));
        assert_eq!(Game::from_version("Starfield v1.7.23"), None);
    }

    #[test]
    fn test_from_crash_log_prefers_version() {
        let log = CrashLog {
            game_version: Some("Fallout 4 VR v1.2.72".to_string()),
            original_lines: vec!["SKSE64 loaded".to_string()],
            ..Default::default()
        };
        assert_eq!(Game::from_crash_log(&log), Some(Game::Fallout4Vr));
    }

    #[test]
    fn test_from_crash_log_falls_back_to_extender() {
        let skyrim = CrashLog {
            original_lines: vec!["SKSE PLUGINS:".to_string(), "skse64_1_6_1170.dll".to_string()],
            ..Default::default()
        };
        let fallout = CrashLog {
            original_lines: vec!["F4SE PLUGINS:".to_string(), "f4se_1_10_163.dll".to_string()],
            ..Default::default()
        };

        assert_eq!(Game::from_crash_log(&skyrim), Some(Game::SkyrimSe));
        assert_eq!(Game::from_crash_log(&fallout), Some(Game::Fallout4));
        assert_eq!(Game::from_crash_log(&CrashLog::default()), None);
    }

    #[test]
    fn test_xse_flavor() {
        assert_eq!(Game::SkyrimVr.xse_flavor(), XseFlavor::Skse);
        assert_eq!(Game::Fallout4.xse_flavor(), XseFlavor::F4se);
        assert!(Game::Fallout4Vr.is_vr());
        assert!(!Game::SkyrimSe.is_vr());
    }
}
