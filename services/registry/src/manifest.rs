//! Image manifests and indexes as returned by the registry.
//!
//! Manifests are kept as the registry sent them: the JSON document is passed
//! through untouched, with the digest and content type from the response
//! headers alongside. Typed accessors cover the fields a detail view needs.

use std::fmt;

use http::HeaderName;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap as _};
use serde_json::{Map, Value};

/// Docker image manifest, schema 2
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker manifest list, schema 2
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI image manifest
pub const OCI_IMAGE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image index
pub const OCI_IMAGE_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// `Accept` header sent with manifest requests, in order of preference.
pub const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.oci.image.index.v1+json";

/// Header carrying the content digest of a manifest.
pub const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");

/// Whether a manifest describes a single image or a set of per-platform images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    /// A single image: config plus layers.
    Image,
    /// A manifest list or OCI index.
    Index,
}

/// A manifest fetched from the registry.
///
/// Serializes as one flat object: `digest` and `contentType` from the headers,
/// then every member of the document. A document member with either name
/// takes precedence over the header value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Value of the `Docker-Content-Digest` response header
    pub digest: Option<String>,

    /// Value of the `Content-Type` response header
    pub content_type: Option<String>,

    /// The manifest document, field for field
    #[serde(flatten)]
    pub document: Map<String, Value>,
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.document.contains_key("digest") {
            map.serialize_entry("digest", &self.digest)?;
        }
        if !self.document.contains_key("contentType") {
            map.serialize_entry("contentType", &self.content_type)?;
        }
        for (key, value) in &self.document {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Manifest {
    /// Combine a manifest document with the response headers describing it.
    pub fn new(
        digest: Option<String>,
        content_type: Option<String>,
        document: Map<String, Value>,
    ) -> Self {
        Self {
            digest,
            content_type,
            document,
        }
    }

    /// The manifest media type: the document's `mediaType`, or the response content type.
    pub fn media_type(&self) -> Option<&str> {
        self.document
            .get("mediaType")
            .and_then(Value::as_str)
            .filter(|media_type| !media_type.is_empty())
            .or(self.content_type.as_deref())
    }

    /// Whether this is a single image or an index of images.
    pub fn kind(&self) -> ManifestKind {
        match self.media_type() {
            Some(media_type)
                if media_type.contains("manifest.list") || media_type.contains("image.index") =>
            {
                ManifestKind::Index
            }
            _ => ManifestKind::Image,
        }
    }

    /// Shorthand for `kind() == ManifestKind::Index`.
    pub fn is_index(&self) -> bool {
        self.kind() == ManifestKind::Index
    }

    /// The `schemaVersion` member.
    pub fn schema_version(&self) -> Option<u64> {
        self.document.get("schemaVersion").and_then(Value::as_u64)
    }

    /// Digest of the image config blob.
    pub fn config_digest(&self) -> Option<&str> {
        self.document
            .get("config")
            .and_then(|config| config.get("digest"))
            .and_then(Value::as_str)
    }

    /// Layer descriptors of an image manifest.
    pub fn layers(&self) -> Vec<Descriptor> {
        self.descriptors("layers")
    }

    /// Child manifest descriptors of an index.
    pub fn manifests(&self) -> Vec<Descriptor> {
        self.descriptors("manifests")
    }

    /// Platforms of the child manifests of an index.
    pub fn platforms(&self) -> Vec<Platform> {
        self.manifests()
            .into_iter()
            .filter_map(|descriptor| descriptor.platform)
            .collect()
    }

    /// Total size in bytes: child manifest sizes for an index, layer sizes otherwise.
    ///
    /// `None` when the document lists neither.
    pub fn total_size(&self) -> Option<u64> {
        let key = if self.is_index() && self.document.get("manifests").is_some_and(Value::is_array)
        {
            "manifests"
        } else {
            "layers"
        };

        let entries = self.document.get(key)?.as_array()?;
        Some(
            entries
                .iter()
                .filter_map(|entry| entry.get("size").and_then(Value::as_u64))
                .sum(),
        )
    }

    fn descriptors(&self, key: &str) -> Vec<Descriptor> {
        self.document
            .get(key)
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| Descriptor::deserialize(entry).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A reference to a blob or child manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    pub media_type: Option<String>,
    /// Content digest
    pub digest: Option<String>,
    /// Size in bytes
    pub size: Option<u64>,
    /// Target platform, for index entries
    pub platform: Option<Platform>,
}

/// The platform an image in an index was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, e.g. `linux`
    pub os: Option<String>,
    /// CPU architecture, e.g. `arm64`
    pub architecture: Option<String>,
    /// Architecture variant, e.g. `v8`
    pub variant: Option<String>,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.os.as_deref().unwrap_or_default(),
            self.architecture.as_deref().unwrap_or_default()
        )?;
        if let Some(variant) = self.variant.as_deref().filter(|v| !v.is_empty()) {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

/// Format a byte count for display, e.g. `1.50 KB`. Zero or unknown is `-`.
pub fn format_bytes(bytes: Option<u64>) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let Some(bytes) = bytes.filter(|bytes| *bytes > 0) else {
        return "-".to_owned();
    };

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn manifest(content_type: Option<&str>, document: Value) -> Manifest {
        let Value::Object(document) = document else {
            panic!("manifest fixtures are objects");
        };
        Manifest::new(
            Some("sha256:abc".to_owned()),
            content_type.map(str::to_owned),
            document,
        )
    }

    #[test]
    fn accept_header_order() {
        let expected = [
            DOCKER_MANIFEST_V2,
            DOCKER_MANIFEST_LIST_V2,
            OCI_IMAGE_MANIFEST,
            OCI_IMAGE_INDEX,
        ]
        .join(", ");
        assert_eq!(MANIFEST_ACCEPT, expected);
    }

    #[test]
    fn image_manifest() {
        let manifest = manifest(
            Some(DOCKER_MANIFEST_V2),
            json!({
                "schemaVersion": 2,
                "mediaType": DOCKER_MANIFEST_V2,
                "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "size": 7023, "digest": "sha256:cfg"},
                "layers": [
                    {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 1024, "digest": "sha256:l1"},
                    {"mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 512, "digest": "sha256:l2"}
                ]
            }),
        );

        assert_eq!(manifest.kind(), ManifestKind::Image);
        assert_eq!(manifest.schema_version(), Some(2));
        assert_eq!(manifest.config_digest(), Some("sha256:cfg"));
        assert_eq!(manifest.layers().len(), 2);
        assert_eq!(manifest.layers()[1].digest.as_deref(), Some("sha256:l2"));
        assert_eq!(manifest.total_size(), Some(1536));
        assert!(manifest.platforms().is_empty());
    }

    #[test]
    fn index_from_content_type() {
        let manifest = manifest(
            Some(OCI_IMAGE_INDEX),
            json!({
                "schemaVersion": 2,
                "manifests": [
                    {"digest": "sha256:amd", "size": 100, "platform": {"os": "linux", "architecture": "amd64"}},
                    {"digest": "sha256:arm", "size": 200, "platform": {"os": "linux", "architecture": "arm64", "variant": "v8"}},
                    {"digest": "sha256:att", "platform": {"os": "unknown", "architecture": "unknown"}}
                ]
            }),
        );

        assert_eq!(manifest.media_type(), Some(OCI_IMAGE_INDEX));
        assert!(manifest.is_index());
        assert_eq!(manifest.total_size(), Some(300));

        let platforms: Vec<String> = manifest.platforms().iter().map(ToString::to_string).collect();
        assert_eq!(platforms, ["linux/amd64", "linux/arm64/v8", "unknown/unknown"]);
    }

    #[test]
    fn no_size_without_entries() {
        let manifest = manifest(None, json!({"schemaVersion": 1, "name": "app"}));
        assert_eq!(manifest.kind(), ManifestKind::Image);
        assert_eq!(manifest.total_size(), None);
        assert_eq!(manifest.media_type(), None);
    }

    #[test]
    fn serializes_flat() {
        let mut manifest = manifest(
            Some(OCI_IMAGE_MANIFEST),
            json!({"schemaVersion": 2, "layers": []}),
        );
        manifest.digest = None;

        assert_eq!(
            serde_json::to_value(&manifest).unwrap(),
            json!({
                "digest": null,
                "contentType": OCI_IMAGE_MANIFEST,
                "schemaVersion": 2,
                "layers": []
            })
        );
    }

    #[test]
    fn document_members_win_over_headers() {
        let manifest = Manifest::new(
            Some("sha256:header".into()),
            Some(OCI_IMAGE_MANIFEST.into()),
            json!({"schemaVersion": 2, "digest": "sha256:body", "contentType": 7})
                .as_object()
                .cloned()
                .unwrap(),
        );

        assert_eq!(manifest.digest.as_deref(), Some("sha256:header"));
        assert_eq!(manifest.document["digest"], "sha256:body");

        let serialized = serde_json::to_string(&manifest).unwrap();
        assert_eq!(serialized.matches("\"digest\"").count(), 1);
        assert_eq!(
            serde_json::from_str::<Value>(&serialized).unwrap(),
            json!({"digest": "sha256:body", "contentType": 7, "schemaVersion": 2})
        );
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(None), "-");
        assert_eq!(format_bytes(Some(0)), "-");
        assert_eq!(format_bytes(Some(512)), "512.00 B");
        assert_eq!(format_bytes(Some(1536)), "1.50 KB");
        assert_eq!(format_bytes(Some(5 * 1024 * 1024)), "5.00 MB");
        assert_eq!(format_bytes(Some(5 * 1024u64.pow(4))), "5120.00 GB");
    }
}
