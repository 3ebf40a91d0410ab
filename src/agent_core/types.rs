//! Shared data types for the agent core.

use serde::{Deserialize, Serialize};

/// Viewer scene carried alongside a turn.
///
/// Opaque to orchestration: `id` is the focus term, `i` the comma-separated
/// image list. Echoed back with the final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneContext {
    pub id: String,
    #[serde(default)]
    pub i: String,
}

impl SceneContext {
    /// Browser URL for this scene in the VFB viewer.
    pub fn viewer_url(&self) -> String {
        let mut url = format!(
            "https://v2.virtualflybrain.org/org.geppetto.frontend/geppetto?id={}",
            self.id
        );
        if !self.i.is_empty() {
            url.push_str("&i=");
            url.push_str(&self.i);
        }
        url
    }
}

/// A `[label](ID)` entity reference extracted from answer text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermReference {
    pub label: String,
    pub id: String,
}

/// An image reference surviving the reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    pub thumbnail: String,
    pub label: String,
}

/// The structured product of a completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// Final answer text, entity references linkified.
    pub content: String,
    /// Entity references present in `content`.
    pub references: Vec<TermReference>,
    /// Image references mentioned in the answer.
    pub thumbnails: Vec<ThumbnailRecord>,
    /// Scene echoed from the request, if one was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<SceneContext>,
    /// Viewer URL for `scene`, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_url: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_url_with_images() {
        let scene = SceneContext {
            id: "VFB_00017894".into(),
            i: "VFB_00017894,VFB_00030786".into(),
        };
        assert_eq!(
            scene.viewer_url(),
            "https://v2.virtualflybrain.org/org.geppetto.frontend/geppetto?id=VFB_00017894&i=VFB_00017894,VFB_00030786"
        );
    }

    #[test]
    fn viewer_url_without_images_omits_i() {
        let scene = SceneContext { id: "VFB_00017894".into(), i: String::new() };
        assert!(!scene.viewer_url().contains("&i="));
    }

    #[test]
    fn scene_context_deserializes_without_i() {
        let scene: SceneContext = serde_json::from_str(r#"{"id":"VFB_00017894"}"#).unwrap();
        assert_eq!(scene.i, "");
    }
}
