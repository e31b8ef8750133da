//! Chat embed payload (the Discord "embeds" shape) for a note.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::card::template::FOOTER;
use crate::misskey::Note;
use crate::sanitize::summary;

pub const EMBED_COLOR: u32 = 3447003;

const DESCRIPTION_MAX_LEN: usize = 2000;
const QUOTE_MAX_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedResponse {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub author: EmbedAuthor,
    pub description: String,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    pub footer: EmbedFooter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

pub fn discord_embed(note: &Note) -> EmbedResponse {
    let mut fields = Vec::new();

    let image = note
        .files
        .first()
        .filter(|file| file.is_image())
        .map(|file| EmbedImage {
            url: file.url.clone(),
        });

    if note.files.len() > 1 {
        fields.push(EmbedField {
            name: "Attachments".to_string(),
            value: format!("{} files attached", note.files.len()),
        });
    }

    if let Some(quoted) = note.quoted() {
        fields.push(EmbedField {
            name: "Quoting".to_string(),
            value: format!(
                "@{}: {}",
                quoted.user.username,
                summary(quoted.text.as_deref(), QUOTE_MAX_LEN)
            ),
        });
    }

    let embed = Embed {
        author: EmbedAuthor {
            name: note.user.display_name().to_string(),
            icon_url: note.user.avatar_url.clone(),
        },
        description: summary(note.text.as_deref(), DESCRIPTION_MAX_LEN),
        color: EMBED_COLOR,
        timestamp: note.created_at,
        footer: EmbedFooter {
            text: FOOTER.to_string(),
        },
        image,
        fields,
    };

    EmbedResponse {
        embeds: vec![embed],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note(value: serde_json::Value) -> Note {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_plain_note() {
        let response = discord_embed(&note(json!({
            "id": "n1",
            "text": "<p>hello</p>",
            "createdAt": "2024-05-01T12:00:00Z",
            "user": {"id": "u1", "username": "alice", "name": "Alice", "avatarUrl": "https://x/a.png"}
        })));

        let value = serde_json::to_value(&response).unwrap();
        let embed = &value["embeds"][0];
        assert_eq!(embed["author"]["name"], "Alice");
        assert_eq!(embed["author"]["icon_url"], "https://x/a.png");
        assert_eq!(embed["description"], "hello");
        assert_eq!(embed["color"], 3447003);
        assert_eq!(embed["timestamp"], "2024-05-01T12:00:00Z");
        assert_eq!(embed["footer"]["text"], FOOTER);
        assert!(embed.get("image").is_none());
        assert_eq!(embed["fields"], json!([]));
    }

    #[test]
    fn test_attachments_and_quote() {
        let response = discord_embed(&note(json!({
            "id": "n1",
            "text": "quoting",
            "createdAt": "2024-05-01T12:00:00Z",
            "user": {"id": "u1", "username": "alice"},
            "files": [
                {"url": "https://x/1.png", "thumbnailUrl": "https://x/t1.png", "type": "image/png"},
                {"url": "https://x/2.png", "type": "image/png"}
            ],
            "renote": {
                "id": "n0",
                "text": "<b>original</b>",
                "createdAt": "2024-04-01T12:00:00Z",
                "user": {"id": "u2", "username": "bob", "name": "Bob"}
            }
        })));

        let embed = &response.embeds[0];
        assert_eq!(embed.image.as_ref().unwrap().url, "https://x/1.png");
        assert_eq!(
            embed.fields,
            vec![
                EmbedField {
                    name: "Attachments".into(),
                    value: "2 files attached".into()
                },
                EmbedField {
                    name: "Quoting".into(),
                    value: "@bob: original".into()
                },
            ]
        );
    }

    #[test]
    fn test_non_image_first_file_has_no_image() {
        let response = discord_embed(&note(json!({
            "id": "n1",
            "createdAt": "2024-05-01T12:00:00Z",
            "user": {"id": "u1", "username": "alice"},
            "files": [{"url": "https://x/clip.mp4", "type": "video/mp4"}]
        })));

        let embed = &response.embeds[0];
        assert!(embed.image.is_none());
        assert!(embed.fields.is_empty());
        assert_eq!(embed.description, "");
    }
}
