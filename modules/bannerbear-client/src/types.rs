use serde::{Deserialize, Serialize};

/// One layer override applied to a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Modification {
    pub fn image(name: impl Into<String>, image_uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_uid: Some(image_uid.into()),
            text: None,
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_uid: None,
            text: Some(text.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest<'a> {
    pub template: &'a str,
    pub modifications: &'a [Modification],
}

/// Response to an image upload or render submission.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    pub uid: String,
}

/// Current state of a render as reported by `GET /renders/{uid}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderData {
    #[serde(default)]
    pub uid: Option<String>,
    pub status: String,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifications_omit_unused_fields() {
        let mods = vec![
            Modification::image("image_layer", "img_123"),
            Modification::text("title_text", "Breathe"),
        ];
        let json = serde_json::to_value(RenderRequest {
            template: "tmpl_1",
            modifications: &mods,
        })
        .unwrap();
        assert_eq!(json["template"], "tmpl_1");
        assert_eq!(json["modifications"][0]["image_uid"], "img_123");
        assert!(json["modifications"][0].get("text").is_none());
        assert_eq!(json["modifications"][1]["text"], "Breathe");
        assert!(json["modifications"][1].get("image_uid").is_none());
    }

    #[test]
    fn render_data_without_video_url() {
        let data: RenderData =
            serde_json::from_str(r#"{"uid": "r1", "status": "rendering"}"#).unwrap();
        assert_eq!(data.status, "rendering");
        assert!(data.video_url.is_none());
    }
}
