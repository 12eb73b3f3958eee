//! Playlists loaded from JSON files on disk.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use shared::{GameConfig, RevealedSong, SongView};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub year: i32,
    /// Media URI handed to the player service
    pub uri: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub trivia: Option<String>,
}

impl Track {
    pub fn teaser(&self) -> SongView {
        SongView {
            title: self.title.clone(),
            artist: self.artist.clone(),
            cover_url: self.cover_url.clone(),
        }
    }

    pub fn revealed(&self) -> RevealedSong {
        RevealedSong {
            title: self.title.clone(),
            artist: self.artist.clone(),
            cover_url: self.cover_url.clone(),
            year: self.year,
            trivia: self.trivia.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub tracks: Vec<Track>,
}

impl Playlist {
    /// Tracks playable under the game's year range
    pub fn tracks_in_range(&self, config: &GameConfig) -> Vec<Track> {
        self.tracks
            .iter()
            .filter(|t| config.year_in_range(t.year))
            .cloned()
            .collect()
    }
}

/// Listing entry for `GET /playlists`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub track_count: usize,
}

#[derive(Debug, Default, Clone)]
pub struct PlaylistLibrary {
    playlists: BTreeMap<String, Playlist>,
}

impl PlaylistLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` file in `dir`. The file stem becomes the playlist id.
    ///
    /// Files that fail to parse are skipped with a warning. A missing
    /// directory yields an empty library.
    pub fn load_dir(dir: &Path) -> std::io::Result<Self> {
        let mut library = Self::new();

        if !dir.exists() {
            warn!("Playlist directory {} does not exist", dir.display());
            return Ok(library);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };

            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Playlist>(&contents) {
                Ok(mut playlist) => {
                    playlist.id = id;
                    info!(
                        "Loaded playlist '{}' ({} tracks)",
                        playlist.name,
                        playlist.tracks.len()
                    );
                    library.insert(playlist);
                }
                Err(e) => warn!("Skipping playlist {}: {}", path.display(), e),
            }
        }

        Ok(library)
    }

    pub fn insert(&mut self, playlist: Playlist) {
        self.playlists.insert(playlist.id.clone(), playlist);
    }

    pub fn get(&self, id: &str) -> Option<&Playlist> {
        self.playlists.get(id)
    }

    pub fn summaries(&self) -> Vec<PlaylistSummary> {
        self.playlists
            .values()
            .map(|p| PlaylistSummary {
                id: p.id.clone(),
                name: p.name.clone(),
                track_count: p.tracks.len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str, year: i32) -> Track {
        Track {
            title: title.to_string(),
            artist: "Artist".to_string(),
            year,
            uri: format!("media://{}", title),
            cover_url: None,
            trivia: None,
        }
    }

    #[test]
    fn test_year_filter_is_inclusive() {
        let playlist = Playlist {
            id: "mix".to_string(),
            name: "Mix".to_string(),
            tracks: vec![track("a", 1979), track("b", 1980), track("c", 1989), track("d", 1990)],
        };

        let config = GameConfig {
            year_range: (1980, 1989),
            ..GameConfig::default()
        };
        let titles: Vec<String> = playlist
            .tracks_in_range(&config)
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[test]
    fn test_teaser_omits_year() {
        let t = Track {
            trivia: Some("Recorded in one take".to_string()),
            ..track("Take On Me", 1985)
        };
        let teaser = t.teaser();
        assert_eq!(teaser.title, "Take On Me");

        let revealed = t.revealed();
        assert_eq!(revealed.year, 1985);
        assert_eq!(revealed.trivia.as_deref(), Some("Recorded in one take"));
    }

    #[test]
    fn test_load_dir_reads_json_files() {
        let dir = std::env::temp_dir().join(format!("playlists-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("eighties.json"),
            r#"{"name": "Eighties", "tracks": [
                {"title": "Take On Me", "artist": "a-ha", "year": 1985, "uri": "spotify:track:1"}
            ]}"#,
        )
        .unwrap();
        std::fs::write(dir.join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let library = PlaylistLibrary::load_dir(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(library.len(), 1);
        let playlist = library.get("eighties").unwrap();
        assert_eq!(playlist.id, "eighties");
        assert_eq!(playlist.tracks[0].year, 1985);
        assert_eq!(
            library.summaries(),
            vec![PlaylistSummary {
                id: "eighties".to_string(),
                name: "Eighties".to_string(),
                track_count: 1,
            }]
        );
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let library = PlaylistLibrary::load_dir(Path::new("/definitely/not/here")).unwrap();
        assert!(library.is_empty());
    }
}
