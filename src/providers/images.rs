use crate::core::ImageRef;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// An image ready to be embedded in a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub mime_type: String,
    /// Base64 payload without any `data:` prefix. Empty when the source
    /// file could not be read.
    pub data: String,
}

impl ResolvedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Split `data:<mime>;base64,<payload>` into its parts. Text without the
/// prefix is returned unchanged with the default MIME type.
pub fn parse_inline(inline: &str) -> ResolvedImage {
    if let Some(rest) = inline.strip_prefix("data:")
        && let Some((header, payload)) = rest.split_once(',')
    {
        let mime = header
            .split(';')
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME);
        return ResolvedImage {
            mime_type: mime.to_string(),
            data: payload.to_string(),
        };
    }
    ResolvedImage {
        mime_type: DEFAULT_IMAGE_MIME.to_string(),
        data: inline.to_string(),
    }
}

pub fn detect_mime(bytes: &[u8]) -> Option<String> {
    infer::get(bytes)
        .map(|info| info.mime_type().to_string())
        .filter(|mime| mime.starts_with("image/"))
}

/// Resolve one image reference. A file that cannot be read yields an empty
/// payload instead of an error so the rest of the request still goes out.
pub async fn resolve_image(image: &ImageRef) -> ResolvedImage {
    match image {
        ImageRef::Inline(inline) => parse_inline(inline),
        ImageRef::File(path) => match tokio::fs::read(path).await {
            Ok(bytes) => ResolvedImage {
                mime_type: detect_mime(&bytes).unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
                data: BASE64_STANDARD.encode(&bytes),
            },
            Err(error) => {
                tracing::warn!(path = %path.display(), "image read failed, sending empty payload: {error}");
                ResolvedImage {
                    mime_type: DEFAULT_IMAGE_MIME.to_string(),
                    data: String::new(),
                }
            }
        },
    }
}

pub async fn resolve_images(images: &[ImageRef]) -> Vec<ResolvedImage> {
    let mut resolved = Vec::with_capacity(images.len());
    for image in images {
        resolved.push(resolve_image(image).await);
    }
    resolved
}
