//! Cross-service track identity.
//!
//! Exports from different services spell the same track differently
//! ("Song (feat. X)", "Song - Remastered 2011", "SONG"). [`normalize`] folds
//! those spellings together and [`IdentityResolver::match_key`] combines the
//! normalized title and artist into a [`MatchKey`]. A curated override table
//! covers inconsistencies normalization cannot fix and is checked first.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separates the title and artist halves of a key. Never survives normalization.
const KEY_SEPARATOR: char = '|';

/// Qualifier words that mark a bracketed or dashed annotation as noise.
const QUALIFIERS: &str = r"feat|ft|featuring|with|remix|mix|edit|version|remaster|remastered|live|mono|stereo|radio|acoustic|demo|explicit|clean|deluxe";

/// Bracketed annotations such as "(feat. X)" or "[Radio Edit]".
static BRACKET_QUALIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"[\(\[][^\)\]]*\b(?:{QUALIFIERS})\b[^\)\]]*[\)\]]")).unwrap()
});

/// Dash suffixes such as " - Remastered 2011" or " - Radio Edit".
static DASH_QUALIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\s+-\s+[^-]*\b(?:{QUALIFIERS})\b.*$")).unwrap());

/// Unbracketed featuring credits such as "Song feat. X".
static FEATURING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+(?:feat\.?|ft\.|featuring)\s+.*$").unwrap());

static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}\s]").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Known metadata inconsistencies: (title substring, artist substring, key).
const BUILTIN_OVERRIDES: &[(&str, &str, &str)] = &[
    ("99 problems", "jay-z", "99 problems|jayz"),
    ("99 problems", "jay z", "99 problems|jayz"),
    ("99 problems", "jayz", "99 problems|jayz"),
    ("halo", "beyonc", "halo|beyonce"),
    ("get the party started", "pink", "get the party started|pink"),
    ("get the party started", "p!nk", "get the party started|pink"),
];

/// Case-folds through upper case so that e.g. "ß" and "SS" fold together.
fn fold_case(text: &str) -> String {
    text.to_uppercase().to_lowercase()
}

fn strip_punctuation(text: &str) -> String {
    let stripped = PUNCTUATION_RE.replace_all(text, "");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Normalizes free text for identity matching.
///
/// Lower-cases, removes featuring/version/remix/edit qualifiers, strips
/// punctuation and collapses whitespace. Text that consists only of a
/// qualifier keeps its punctuation-stripped form instead of becoming empty.
pub fn normalize(text: &str) -> String {
    let folded = fold_case(text);
    let without_brackets = BRACKET_QUALIFIER_RE.replace_all(&folded, " ");
    let without_dash = DASH_QUALIFIER_RE.replace(&without_brackets, "");
    let without_featuring = FEATURING_RE.replace(&without_dash, "");

    let normalized = strip_punctuation(&without_featuring);
    if normalized.is_empty() {
        strip_punctuation(&folded)
    } else {
        normalized
    }
}

/// Normalized identity shared by every spelling of one logical track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchKey(String);

impl MatchKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MatchKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A curated correction mapping a title/artist pair to a fixed key.
///
/// Matching is a case-insensitive substring test on both the title and the
/// artist of the event being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityOverride {
    pub title: String,
    pub artist: String,
    pub key: String,
}

impl IdentityOverride {
    pub fn new(title: &str, artist: &str, key: &str) -> Self {
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            key: key.to_string(),
        }
    }

    fn folded(&self) -> Self {
        Self {
            title: fold_case(&self.title),
            artist: fold_case(&self.artist),
            key: self.key.clone(),
        }
    }

    fn matches(&self, folded_title: &str, folded_artist: &str) -> bool {
        folded_title.contains(&self.title) && folded_artist.contains(&self.artist)
    }
}

/// Resolves track identities using the override table and [`normalize`].
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    /// Stored case-folded; earlier entries win.
    overrides: Vec<IdentityOverride>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl IdentityResolver {
    /// Creates a resolver whose `overrides` are consulted before the built-in table.
    pub fn new(overrides: &[IdentityOverride]) -> Self {
        let builtin = BUILTIN_OVERRIDES
            .iter()
            .map(|(title, artist, key)| IdentityOverride::new(title, artist, key));
        let overrides = overrides
            .iter()
            .cloned()
            .chain(builtin)
            .filter(|o| !o.title.trim().is_empty() && !o.key.trim().is_empty())
            .map(|o| o.folded())
            .collect();
        Self { overrides }
    }

    /// Returns the identity key for a title/artist pair.
    pub fn match_key(&self, track_name: &str, artist_name: &str) -> MatchKey {
        let title = fold_case(track_name);
        let artist = fold_case(artist_name);

        if let Some(o) = self.overrides.iter().find(|o| o.matches(&title, &artist)) {
            return MatchKey(o.key.clone());
        }

        MatchKey(format!(
            "{}{KEY_SEPARATOR}{}",
            normalize(track_name),
            normalize(artist_name)
        ))
    }
}

static DEFAULT_RESOLVER: LazyLock<IdentityResolver> = LazyLock::new(IdentityResolver::default);

/// Resolves a key with the built-in override table only.
pub fn match_key(track_name: &str, artist_name: &str) -> MatchKey {
    DEFAULT_RESOLVER.match_key(track_name, artist_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn normalize_strips_qualifiers() {
        let titles = [
            "Song A (feat. Someone Else)",
            "Song A [Radio Edit]",
            "Song A - Remastered 2011",
            "Song A feat. Someone",
            "  SONG   a!!  ",
            "Don't Stop Me Now (Live at Wembley '86)",
            "(Remix)",
            "Tom's Diner",
        ];
        let normalized: Vec<String> = titles.iter().map(|t| normalize(t)).collect();

        assert_snapshot!(normalized.join("\n"), @r"
        song a
        song a
        song a
        song a
        song a
        dont stop me now
        remix
        toms diner
        ");
    }

    #[test]
    fn normalize_keeps_non_qualifier_brackets() {
        assert_eq!(normalize("Intro (Interlude)"), "intro interlude");
    }

    #[test]
    fn match_key_merges_spellings() {
        let a = match_key("Song A (feat. B)", "Artist X");
        let b = match_key("song a", "ARTIST X.");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "song a|artist x");
    }

    #[test]
    fn match_key_is_case_insensitive() {
        let pairs = [
            ("Stronger", "Kanye West"),
            ("Straße", "Die Ärzte"),
            ("Halo", "Beyoncé"),
            ("Mr. Brightside - 2004 Remaster", "The Killers"),
        ];
        for (title, artist) in pairs {
            assert_eq!(
                match_key(title, artist),
                match_key(&title.to_uppercase(), &artist.to_uppercase()),
                "case folding changed the key for {title}/{artist}"
            );
        }
    }

    #[test]
    fn distinct_artists_stay_distinct() {
        assert_ne!(match_key("Song A", "Artist X"), match_key("Song A", "Artist Y"));
    }

    #[test]
    fn builtin_override_wins() {
        assert_eq!(match_key("Halo", "Beyoncé").as_str(), "halo|beyonce");
        assert_eq!(match_key("HALO", "Beyonce").as_str(), "halo|beyonce");
        assert_eq!(match_key("99 Problems", "JAY-Z").as_str(), "99 problems|jayz");
        assert_eq!(match_key("99 Problems", "Jay Z").as_str(), "99 problems|jayz");
    }

    #[test]
    fn builtin_override_spellings_merge() {
        assert_eq!(
            match_key("Get the Party Started", "P!nk"),
            match_key("Get The Party Started", "Pink")
        );
        assert_eq!(
            match_key("Get the Party Started", "P!NK").as_str(),
            "get the party started|pink"
        );
    }

    #[test]
    fn covers_by_other_artists_keep_their_own_key() {
        assert_eq!(
            match_key("Get the Party Started", "Pitbull").as_str(),
            "get the party started|pitbull"
        );
        assert_eq!(
            match_key("99 Problems", "Hugo").as_str(),
            "99 problems|hugo"
        );
        assert_eq!(
            match_key("99 Problems", "Jaymes Young").as_str(),
            "99 problems|jaymes young"
        );
    }

    #[test]
    fn custom_override_precedes_builtin() {
        let resolver = IdentityResolver::new(&[IdentityOverride::new("Halo", "", "custom|halo")]);
        assert_eq!(resolver.match_key("Halo", "Beyoncé").as_str(), "custom|halo");
    }

    #[test]
    fn override_with_empty_title_is_ignored() {
        let resolver = IdentityResolver::new(&[IdentityOverride::new(" ", "", "everything")]);
        assert_eq!(resolver.match_key("Song", "Artist").as_str(), "song|artist");
    }
}
