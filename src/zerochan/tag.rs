use std::fmt;

use log::warn;

/// Site root, also sent as the `Referer` of every request.
pub(crate) const SITE_ROOT: &str = "https://www.zerochan.net/";

/// Host serving full-size images.
const STATIC_ROOT: &str = "https://static.zerochan.net/";

/// Image extensions tried for a static asset, in order.
pub(crate) const ASSET_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// A subscription tag as written in the subscription file, e.g. `Artoria+Pendragon`.
///
/// `+` stands for a space; the author may also have percent-escaped special characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Tag {
    raw: String,
}

impl Tag {
    /// Wraps a trimmed, non-empty line from the subscription file.
    pub(crate) fn new(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        Some(Self { raw: raw.to_string() })
    }

    /// The tag exactly as subscribed.
    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    /// The tag with `+` and spaces replaced by `.`, as used in asset URLs.
    pub(crate) fn dotted(&self) -> String {
        self.raw.replace(['+', ' '], ".")
    }

    /// [Tag::dotted] with characters that cannot appear in a file name replaced by `_`.
    pub(crate) fn file_prefix(&self) -> String {
        self.dotted().replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
    }

    /// Key of this tag in the downloaded-ID index.
    pub(crate) fn index_key(&self) -> String {
        self.file_prefix().to_lowercase()
    }

    /// URL path component for the listing page.
    ///
    /// Existing `%xx` escapes are decoded first so they are never encoded twice; spaces become
    /// `+` and everything but unreserved characters and `+` is percent-encoded, `/` included.
    pub(crate) fn slug(&self) -> String {
        let decoded = match urlencoding::decode(&self.raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(e) => {
                warn!("Tag \"{}\" is not valid percent-encoded UTF-8 ({}), using it as-is", self.raw, e);
                self.raw.clone()
            }
        };

        decoded
            .replace(' ', "+")
            .split('+')
            .map(|word| urlencoding::encode(word).into_owned())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Listing page URL. Page 1 has no page parameter.
    pub(crate) fn page_url(&self, page: u32) -> String {
        let base = format!("{}{}", SITE_ROOT, self.slug());
        if page <= 1 {
            base
        } else {
            format!("{}?p={}", base, page)
        }
    }

    /// Full-size asset URL for an identifier with the given extension.
    pub(crate) fn asset_url(&self, id: u64, extension: &str) -> String {
        let path = self.dotted().replace('/', "%2F");
        format!("{}{}.full.{}.{}", STATIC_ROOT, path, id, extension)
    }

    /// File name an identifier is saved under.
    pub(crate) fn file_name(&self, id: u64, extension: &str) -> String {
        format!("{}_{}.{}", self.file_prefix(), id, extension)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_tags_are_rejected() {
        assert!(Tag::new("").is_none());
        assert!(Tag::new("   ").is_none());
        assert_eq!(Tag::new("  Saber  ").unwrap().as_str(), "Saber");
    }

    #[test]
    fn test_dotted_and_index_key() {
        let tag = Tag::new("Artoria+Caster").unwrap();
        assert_eq!(tag.dotted(), "Artoria.Caster");
        assert_eq!(tag.index_key(), "artoria.caster");
        assert_eq!(tag.file_name(4572543, "jpg"), "Artoria.Caster_4572543.jpg");
    }

    #[test]
    fn test_slug_does_not_double_encode() {
        assert_eq!(Tag::new("Artoria+Caster").unwrap().slug(), "Artoria+Caster");
        assert_eq!(Tag::new("Artoria Caster").unwrap().slug(), "Artoria+Caster");
        assert_eq!(Tag::new("Jeanne+d%27Arc").unwrap().slug(), "Jeanne+d%27Arc");
        assert_eq!(Tag::new("Jeanne+d'Arc").unwrap().slug(), "Jeanne+d%27Arc");
    }

    #[test]
    fn test_spaces_are_dotted_like_plus() {
        let tag = Tag::new("Artoria Caster").unwrap();
        assert_eq!(tag.dotted(), "Artoria.Caster");
        assert_eq!(tag.file_name(1, "jpg"), "Artoria.Caster_1.jpg");
        assert_eq!(
            tag.asset_url(1, "jpg"),
            "https://static.zerochan.net/Artoria.Caster.full.1.jpg"
        );
        assert_eq!(tag.index_key(), Tag::new("Artoria+Caster").unwrap().index_key());
    }

    #[test]
    fn test_slash_is_encoded_and_kept_out_of_file_names() {
        let tag = Tag::new("Fate/stay+night").unwrap();
        assert_eq!(tag.slug(), "Fate%2Fstay+night");
        assert_eq!(tag.page_url(2), "https://www.zerochan.net/Fate%2Fstay+night?p=2");
        assert_eq!(tag.file_name(1, "jpg"), "Fate_stay.night_1.jpg");
        assert_eq!(tag.index_key(), "fate_stay.night");
        assert_eq!(
            tag.asset_url(1, "png"),
            "https://static.zerochan.net/Fate%2Fstay.night.full.1.png"
        );
        assert_eq!(Tag::new("Fate%2Fstay+night").unwrap().slug(), "Fate%2Fstay+night");
    }

    #[test]
    fn test_page_urls() {
        let tag = Tag::new("Saber+Alter").unwrap();
        assert_eq!(tag.page_url(1), "https://www.zerochan.net/Saber+Alter");
        assert_eq!(tag.page_url(3), "https://www.zerochan.net/Saber+Alter?p=3");
    }

    #[test]
    fn test_asset_url() {
        let tag = Tag::new("Saber+Alter").unwrap();
        assert_eq!(
            tag.asset_url(123, "png"),
            "https://static.zerochan.net/Saber.Alter.full.123.png"
        );
    }
}
