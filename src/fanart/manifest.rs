//! Parsed fanart manifest with typed, fallback-aware lookups.

use std::path::Path;

use log::debug;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ParseError;
use crate::protocol::ImageKind;

/// One image entry listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Element name, e.g. `musiclogo` or `hdmusiclogo`.
    pub element: String,
    pub url: String,
}

impl ManifestEntry {
    fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Element names a single-valued category is listed under.
struct CategoryLayout {
    section: &'static str,
    standard: &'static str,
    hd: Option<&'static str>,
}

fn layout_for(kind: ImageKind) -> Option<CategoryLayout> {
    let layout = match kind {
        ImageKind::Logo => CategoryLayout {
            section: "musiclogos",
            standard: "musiclogo",
            hd: Some("hdmusiclogo"),
        },
        ImageKind::Art => CategoryLayout {
            section: "musicarts",
            standard: "musicart",
            hd: Some("hdmusicart"),
        },
        ImageKind::Banner => CategoryLayout {
            section: "musicbanners",
            standard: "musicbanner",
            hd: Some("hdmusicbanner"),
        },
        ImageKind::Primary => CategoryLayout {
            section: "artistthumbs",
            standard: "artistthumb",
            hd: None,
        },
        ImageKind::Backdrop => return None,
    };
    Some(layout)
}

const BACKDROP_SECTION: &str = "artistbackgrounds";

/// Artist entries from `/fanart/music`, grouped by section in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    sections: Vec<(String, Vec<ManifestEntry>)>,
}

impl Manifest {
    /// Reads and parses a stored manifest.
    pub async fn load(path: &Path) -> Result<Self, ParseError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ParseError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&bytes, path)
    }

    /// Parses manifest bytes; `origin` only labels errors.
    pub fn parse(xml: &[u8], origin: &Path) -> Result<Self, ParseError> {
        let origin_label = || origin.display().to_string();
        let malformed = |message: String| ParseError::Malformed {
            path: origin_label(),
            message,
        };

        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut manifest = Manifest::default();
        let mut stack: Vec<String> = Vec::new();
        let mut saw_root = false;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    if stack.is_empty() && saw_root {
                        return Err(malformed("multiple root elements".to_string()));
                    }
                    saw_root = true;
                    manifest.collect(&stack, &e, reader.decoder());
                    stack.push(local_name(&e));
                }
                Ok(Event::Empty(e)) => {
                    if stack.is_empty() && saw_root {
                        return Err(malformed("multiple root elements".to_string()));
                    }
                    saw_root = true;
                    manifest.collect(&stack, &e, reader.decoder());
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Eof) => break,
                Err(err) => {
                    return Err(malformed(format!(
                        "XML parse error at byte {}: {}",
                        reader.error_position(),
                        err
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        if !saw_root {
            return Err(ParseError::Empty {
                path: origin_label(),
            });
        }
        if let Some(open) = stack.last() {
            return Err(malformed(format!("unterminated element <{open}>")));
        }
        Ok(manifest)
    }

    /// Records `element` when it sits inside a `/fanart/music/<section>` subtree.
    fn collect(&mut self, ancestors: &[String], element: &BytesStart<'_>, decoder: Decoder) {
        let [root, music, section, rest @ ..] = ancestors else {
            return;
        };
        if root != "fanart" || music != "music" {
            return;
        }
        let name = local_name(element);
        // Single-valued sections only list direct children; backdrops accept any depth.
        if !rest.is_empty() && section != BACKDROP_SECTION {
            return;
        }
        let Some(entry) = entry_from_element(name, element, decoder) else {
            return;
        };

        match self.sections.iter_mut().find(|(key, _)| key == section) {
            Some((_, entries)) => entries.push(entry),
            None => self.sections.push((section.clone(), vec![entry])),
        }
    }

    fn section(&self, name: &str) -> &[ManifestEntry] {
        self.sections
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    fn first_with_element(&self, section: &str, element: &str) -> Option<&ManifestEntry> {
        self.section(section)
            .iter()
            .find(|entry| entry.element == element && entry.has_url())
    }

    /// Best single URL for `kind`.
    ///
    /// With `prefer_hd` the first non-empty HD entry wins; otherwise, or when
    /// no HD entry is usable, the first non-empty standard entry is used.
    pub fn first_match(&self, kind: ImageKind, prefer_hd: bool) -> Option<&str> {
        let Some(layout) = layout_for(kind) else {
            return self.all_matches(kind).into_iter().next();
        };

        let hd = layout
            .hd
            .filter(|_| prefer_hd)
            .and_then(|element| self.first_with_element(layout.section, element));
        hd.or_else(|| self.first_with_element(layout.section, layout.standard))
            .map(|entry| entry.url.as_str())
    }

    /// Every usable URL for `kind` in document order.
    pub fn all_matches(&self, kind: ImageKind) -> Vec<&str> {
        match layout_for(kind) {
            Some(layout) => self
                .section(layout.section)
                .iter()
                .filter(|entry| entry.has_url())
                .filter(|entry| {
                    entry.element == layout.standard || Some(entry.element.as_str()) == layout.hd
                })
                .map(|entry| entry.url.as_str())
                .collect(),
            None => self
                .section(BACKDROP_SECTION)
                .iter()
                .filter(|entry| entry.has_url())
                .map(|entry| entry.url.as_str())
                .collect(),
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).to_string()
}

/// Entries without a `url`, or whose `url` has a malformed escape, are dropped.
fn entry_from_element(
    element: String,
    start: &BytesStart<'_>,
    decoder: Decoder,
) -> Option<ManifestEntry> {
    let attr = start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"url")?;
    match attr.decode_and_unescape_value(decoder) {
        Ok(url) => Some(ManifestEntry {
            element,
            url: url.into_owned(),
        }),
        Err(err) => {
            debug!("Dropping <{}> with unreadable url: {}", element, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Manifest;
    use log::debug;

use crate::error::ParseError;
    use crate::protocol::ImageKind;
    use std::path::Path;

    fn parse(xml: &str) -> Result<Manifest, ParseError> {
        Manifest::parse(xml.as_bytes(), Path::new("fanart.xml"))
    }

    const FULL_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fanart>
  <music id="mbid-1" name="Sample Group">
    <musiclogos>
      <musiclogo id="11" url="http://img/logo-std.png" likes="3"/>
      <hdmusiclogo id="12" url="http://img/logo-hd.png" likes="7"/>
    </musiclogos>
    <artistbackgrounds>
      <artistbackground id="21" url="http://img/bg1.jpg" likes="1"/>
      <artistbackground id="22" url="http://img/bg2.jpg"/>
    </artistbackgrounds>
    <artistthumbs>
      <artistthumb id="31" url="http://img/thumb.jpg"/>
    </artistthumbs>
    <musicbanners>
      <musicbanner id="41" url="http://img/banner.jpg"/>
    </musicbanners>
    <albums>
      <album id="album-1">
        <cdart id="51" url="http://img/cdart.png"/>
      </album>
    </albums>
  </music>
</fanart>"#;

    #[test]
    fn test_hd_logo_preferred_when_enabled() {
        let manifest = parse(FULL_MANIFEST).expect("parse");
        assert_eq!(
            manifest.first_match(ImageKind::Logo, true),
            Some("http://img/logo-hd.png")
        );
        assert_eq!(
            manifest.first_match(ImageKind::Logo, false),
            Some("http://img/logo-std.png")
        );
    }

    #[test]
    fn test_standard_only_logo_resolves_regardless_of_preference() {
        let manifest = parse(
            r#"<fanart><music><musiclogos>
                 <musiclogo url="http://img/logo-std.png"/>
               </musiclogos></music></fanart>"#,
        )
        .expect("parse");
        assert_eq!(
            manifest.first_match(ImageKind::Logo, true),
            Some("http://img/logo-std.png")
        );
        assert_eq!(
            manifest.first_match(ImageKind::Logo, false),
            Some("http://img/logo-std.png")
        );
    }

    #[test]
    fn test_empty_hd_url_falls_back_to_standard_entry() {
        let manifest = parse(
            r#"<fanart><music><musicarts>
                 <hdmusicart url=""/>
                 <musicart url="http://img/art.png"/>
               </musicarts></music></fanart>"#,
        )
        .expect("parse");
        assert_eq!(
            manifest.first_match(ImageKind::Art, true),
            Some("http://img/art.png")
        );
    }

    #[test]
    fn test_backdrops_listed_in_document_order_at_any_depth() {
        let manifest = parse(
            r#"<fanart><music><artistbackgrounds>
                 <artistbackground url="http://img/bg1.jpg"/>
                 <group><artistbackground url="http://img/bg2.jpg"/></group>
                 <artistbackground url=""/>
                 <artistbackground url="http://img/bg3.jpg"/>
               </artistbackgrounds></music></fanart>"#,
        )
        .expect("parse");
        assert_eq!(
            manifest.all_matches(ImageKind::Backdrop),
            vec!["http://img/bg1.jpg", "http://img/bg2.jpg", "http://img/bg3.jpg"]
        );
        assert_eq!(
            manifest.first_match(ImageKind::Backdrop, true),
            Some("http://img/bg1.jpg")
        );
    }

    #[test]
    fn test_album_sections_and_missing_categories_yield_nothing() {
        let manifest = parse(FULL_MANIFEST).expect("parse");
        assert_eq!(manifest.first_match(ImageKind::Art, true), None);
        assert!(manifest.all_matches(ImageKind::Art).is_empty());
        assert_eq!(
            manifest.first_match(ImageKind::Primary, true),
            Some("http://img/thumb.jpg")
        );
        assert_eq!(
            manifest.first_match(ImageKind::Banner, true),
            Some("http://img/banner.jpg")
        );
    }

    #[test]
    fn test_malformed_url_escape_drops_the_entry() {
        let manifest = parse(
            r#"<fanart><music><musiclogos>
                 <musiclogo url="http://img/bad&bogus;.png"/>
                 <musiclogo url="http://img/good.png"/>
               </musiclogos></music></fanart>"#,
        )
        .expect("parse");
        assert_eq!(
            manifest.all_matches(ImageKind::Logo),
            vec!["http://img/good.png"]
        );
    }

    #[test]
    fn test_escaped_urls_are_unescaped() {
        let manifest = parse(
            r#"<fanart><music><musiclogos>
                 <musiclogo url="http://img/logo.png?a=1&amp;b=2"/>
               </musiclogos></music></fanart>"#,
        )
        .expect("parse");
        assert_eq!(
            manifest.first_match(ImageKind::Logo, false),
            Some("http://img/logo.png?a=1&b=2")
        );
    }

    #[test]
    fn test_document_without_music_section_parses_empty() {
        let manifest = parse("<fanart/>").expect("parse");
        for kind in ImageKind::ALL {
            assert!(manifest.all_matches(kind).is_empty());
        }
    }

    #[test]
    fn test_unusable_documents_are_parse_errors() {
        assert!(matches!(parse(""), Err(ParseError::Empty { .. })));
        assert!(matches!(
            parse("<?xml version=\"1.0\"?>"),
            Err(ParseError::Empty { .. })
        ));
        assert!(matches!(
            parse("<fanart><music><musiclogos>"),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(
            parse("<fanart><music></fanart>"),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_reports_missing_file_as_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = Manifest::load(&dir.path().join("fanart.xml"))
            .await
            .expect_err("missing file");
        assert!(matches!(error, ParseError::Io { .. }));
    }
}
