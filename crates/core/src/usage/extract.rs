//! Built-in decoders and reference extractors for text-based assets.

use assetkeep_api::{AssetDecoder, AssetId, AssetKind, AssetObject, DecodeError, ReferenceExtractor};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// A quoted string ending in a file extension.
static QUOTED_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"\s:*?<>|]+\.[A-Za-z][A-Za-z0-9]{0,7})""#)
        .expect("quoted path pattern is valid")
});

/// Extractors keyed by the kind of the referencing asset.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<AssetKind, Arc<dyn ReferenceExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: AssetKind, extractor: Arc<dyn ReferenceExtractor>) {
        self.extractors.insert(kind, extractor);
    }

    pub fn get(&self, kind: AssetKind) -> Option<Arc<dyn ReferenceExtractor>> {
        self.extractors.get(&kind).cloned()
    }

    pub fn handles(&self, kind: AssetKind) -> bool {
        self.extractors.contains_key(&kind)
    }
}

/// Decodes UTF-8 content into a `String` object.
pub struct TextDecoder;

impl AssetDecoder for TextDecoder {
    fn decode(&self, _id: &AssetId, bytes: &[u8]) -> Result<AssetObject, DecodeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| DecodeError::new(format!("content is not UTF-8 text: {e}")))?;
        Ok(Arc::new(text.to_string()))
    }
}

fn as_text(object: &AssetObject) -> Option<&str> {
    object.downcast_ref::<String>().map(String::as_str)
}

/// Quoted asset paths inside text content, e.g. `"atlas/sprites.atlas"`.
#[derive(Default)]
pub struct PathReferenceExtractor;

impl ReferenceExtractor for PathReferenceExtractor {
    fn extract(&self, id: &AssetId, object: &AssetObject) -> BTreeSet<AssetId> {
        let Some(text) = as_text(object) else {
            return BTreeSet::new();
        };
        QUOTED_PATH
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| id.resolve_reference(m.as_str()).ok())
            .filter(|target| target != id && !target.is_root())
            .collect()
    }
}

/// Page images of a libGDX texture atlas.
///
/// Page lines name an image file relative to the atlas folder; region and
/// attribute lines either have no image extension or contain a colon.
#[derive(Default)]
pub struct AtlasPageExtractor;

impl ReferenceExtractor for AtlasPageExtractor {
    fn extract(&self, id: &AssetId, object: &AssetObject) -> BTreeSet<AssetId> {
        let Some(text) = as_text(object) else {
            return BTreeSet::new();
        };
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.contains(':'))
            .filter(|line| AssetKind::from_extension(line.rsplit('.').next().unwrap_or_default()) == AssetKind::Texture)
            .filter_map(|line| id.resolve_reference(&format!("./{line}")).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> AssetId {
        AssetId::parse(raw).unwrap()
    }

    fn text(content: &str) -> AssetObject {
        TextDecoder.decode(&id("x"), content.as_bytes()).unwrap()
    }

    #[test]
    fn test_path_references_in_scene() {
        let scene = id("scene/level1.scene");
        let content = r#"{
            "atlas": "atlas/sprites.atlas",
            "music": "../sfx/theme.ogg",
            "scale": "1.5",
            "name": "Level One",
            "self": "scene/level1.scene",
            "props": ["./props.scene", "gfx\\hero.png"]
        }"#;

        let refs = PathReferenceExtractor.extract(&scene, &text(content));
        let expected: BTreeSet<AssetId> = [
            "atlas/sprites.atlas",
            "sfx/theme.ogg",
            "scene/props.scene",
            "gfx/hero.png",
        ]
        .into_iter()
        .map(id)
        .collect();
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_atlas_pages() {
        let atlas = id("atlas/ui/buttons.atlas");
        let content = "\nbuttons.png\nsize: 256,256\nformat: RGBA8888\nfilter: Linear,Linear\nrepeat: none\nplay\n  rotate: false\n  xy: 0, 0\n\nbuttons2.PNG\nsize: 64,64\n";

        let refs = AtlasPageExtractor.extract(&atlas, &text(content));
        let expected: BTreeSet<AssetId> = ["atlas/ui/buttons.png", "atlas/ui/buttons2.PNG"]
            .into_iter()
            .map(id)
            .collect();
        assert_eq!(refs, expected);
    }

    #[test]
    fn test_text_decoder_rejects_binary() {
        let err = TextDecoder.decode(&id("a.scene"), &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.message().contains("UTF-8"));
    }

    #[test]
    fn test_non_text_object_has_no_references() {
        let object: AssetObject = Arc::new(42u32);
        assert!(PathReferenceExtractor.extract(&id("a.scene"), &object).is_empty());
    }
}
