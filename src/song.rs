use std::fmt;

/// A song as announced by the client. Two announcements refer to the same
/// song if all fields match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

impl Track {
    pub fn new(title: &str, artist: &str, album: Option<&str>) -> Self {
        Self {
            title: title.trim().to_string(),
            artist: artist.trim().to_string(),
            album: album
                .map(|album| album.trim().to_string())
                .filter(|album| !album.is_empty()),
        }
    }

    /// The unsanitized "title - artist" stem of the output file.
    pub fn file_stem(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.album {
            Some(album) => write!(f, "{} by {} on {}", self.title, self.artist, album),
            None => write!(f, "{} by {}", self.title, self.artist),
        }
    }
}
