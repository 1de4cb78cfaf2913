//! Combined JavaScript and CSS resource references.
//!
//! `js_combine` / `css_combine` do not combine anything themselves: they
//! produce a URL pointing at the combiner endpoint, with the file list packed
//! into a single `f` parameter (joined with `,`, zlib-compressed, URL-safe
//! base64 without padding, then URL-encoded). [`decode_file_list`] reverses
//! the packing for the endpoint.

use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use cms_rs_core::options::{is_truthy, CombineOptions, ResourceKind};
use cms_rs_core::request::{root_url, urldecode, urlencode};
use cms_rs_core::{CmsError, CmsResult};

/// Packs a file list into the `f` parameter value.
///
/// # Errors
///
/// Returns a serialization error if compression fails.
pub fn encode_file_list(files: &[String]) -> CmsResult<String> {
    let joined = files.join(",");
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(joined.as_bytes())
        .map_err(|e| CmsError::Serialization(format!("Compression failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CmsError::Serialization(format!("Compression finish failed: {e}")))?;
    Ok(urlencode(&URL_SAFE_NO_PAD.encode(compressed)))
}

/// Unpacks an `f` parameter value. Individual file names come back decoded.
///
/// # Errors
///
/// Returns a serialization error if the value is not a packed file list.
///
/// ```
/// use cms_rs_render::resources::{decode_file_list, encode_file_list};
///
/// let files = vec!["/resources/js/app.js".to_string(), "jquery".to_string()];
/// let packed = encode_file_list(&files).unwrap();
/// assert_eq!(decode_file_list(&packed).unwrap(), files);
/// ```
pub fn decode_file_list(param: &str) -> CmsResult<Vec<String>> {
    let raw = URL_SAFE_NO_PAD
        .decode(urldecode(param).trim_end_matches('='))
        .map_err(|e| CmsError::Serialization(format!("Base64 decode failed: {e}")))?;
    let mut decoder = ZlibDecoder::new(&raw[..]);
    let mut joined = String::new();
    decoder
        .read_to_string(&mut joined)
        .map_err(|e| CmsError::Serialization(format!("Decompression failed: {e}")))?;
    Ok(joined
        .split(',')
        .filter(|file| !file.is_empty())
        .map(urldecode)
        .collect())
}

/// Builds the combiner reference for `files`.
///
/// `resources_base` is where `@`-prefixed theme resources live: the active
/// theme's resources path, or `/` plus the configured resources directory.
///
/// # Errors
///
/// Returns a serialization error if the file list cannot be packed.
pub fn combine_reference(
    kind: ResourceKind,
    files: &[String],
    options: &CombineOptions,
    show_tag: bool,
    root_path: &str,
    resources_base: &str,
) -> CmsResult<String> {
    let files: Vec<String> = files
        .iter()
        .map(|file| urlencode(&resolve_file(file, resources_base)))
        .collect();

    let flags: String = options
        .iter()
        .filter(|(_, value)| is_truthy(value))
        .map(|(name, _)| format!("&amp;{name}=1"))
        .collect();

    let packed = if files.is_empty() {
        String::new()
    } else {
        encode_file_list(&files)?
    };

    Ok(match kind {
        ResourceKind::Javascript => {
            let url = root_url(root_path, &format!("cms_js_combine/?f={packed}{flags}"));
            if show_tag {
                format!("<script type=\"text/javascript\" src=\"{url}\"></script>\n")
            } else {
                url
            }
        }
        ResourceKind::Css => {
            let url = root_url(root_path, &format!("cms_css_combine/?f={packed}{flags}"));
            if show_tag {
                format!("<link rel=\"stylesheet\" type=\"text/css\" href=\"{url}\" />")
            } else {
                url
            }
        }
    })
}

fn resolve_file(file: &str, resources_base: &str) -> String {
    let file = file.trim();
    match file.strip_prefix('@') {
        Some(relative) => {
            let relative = relative.trim_start_matches('/');
            format!("{}/{relative}", resources_base.trim_end_matches('/'))
        }
        None => file.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_theme_resources_are_resolved() {
        assert_eq!(resolve_file("@js/app.js", "/themes/summer/resources"), "/themes/summer/resources/js/app.js");
        assert_eq!(resolve_file(" @/css/a.css ", "/resources/"), "/resources/css/a.css");
        assert_eq!(resolve_file("jquery", "/resources"), "jquery");
    }

    #[test]
    fn test_js_reference_round_trips_through_decoder() {
        let out = combine_reference(
            ResourceKind::Javascript,
            &files(&["jquery", "@js/app.js"]),
            &CombineOptions::new(),
            false,
            "",
            "/resources",
        )
        .unwrap();
        let packed = out.strip_prefix("/cms_js_combine/?f=").unwrap();
        assert_eq!(
            decode_file_list(packed).unwrap(),
            files(&["jquery", "/resources/js/app.js"])
        );
    }

    #[test]
    fn test_truthy_options_become_flags() {
        let mut options = CombineOptions::new();
        options.insert("reset_cache".into(), json!(true));
        options.insert("skip_cache".into(), json!(false));
        options.insert("src_mode".into(), json!(1));
        let out = combine_reference(ResourceKind::Css, &files(&["a.css"]), &options, false, "", "/r")
            .unwrap();
        assert!(out.ends_with("&amp;reset_cache=1&amp;src_mode=1"));
        assert!(!out.contains("skip_cache"));
    }

    #[test]
    fn test_tags() {
        let js = combine_reference(ResourceKind::Javascript, &files(&["a.js"]), &CombineOptions::new(), true, "/store", "/r")
            .unwrap();
        assert!(js.starts_with("<script type=\"text/javascript\" src=\"/store/cms_js_combine/?f="));
        assert!(js.ends_with("\"></script>\n"));

        let css = combine_reference(ResourceKind::Css, &files(&["a.css"]), &CombineOptions::new(), true, "", "/r")
            .unwrap();
        assert!(css.starts_with("<link rel=\"stylesheet\" type=\"text/css\" href=\"/cms_css_combine/?f="));
        assert!(css.ends_with("\" />"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_file_list("%%%not-base64%%%").is_err());
    }
}
