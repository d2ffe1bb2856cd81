//! Once-resolved host handles for the result types.

use crate::host::{Host, HostRef};

/// Well-known name of the host-side result list type.
pub const LIST_CLASS: &str = "DetectionList";
/// Well-known name of the host-side detection record type.
pub const RECORD_CLASS: &str = "Detection";

/// A required handle the host could not resolve.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("host could not resolve class \"{0}\"")]
    Class(&'static str),

    #[error("host could not resolve method \"{name}\" on {class}")]
    Method {
        class: &'static str,
        name: &'static str,
    },

    #[error("host could not resolve field \"{name}\" on {class}")]
    Field {
        class: &'static str,
        name: &'static str,
    },
}

/// Cached class, constructor and member handles for result marshalling.
///
/// Resolved once per initialization and read-only afterwards; the handles
/// here are never released. Resolution is transactional: the first failure
/// aborts and no cache is produced.
pub struct HandleCache {
    pub list_class: HostRef,
    pub list_ctor: HostRef,
    pub list_append: HostRef,
    pub record_class: HostRef,
    pub record_ctor: HostRef,
    pub id_field: HostRef,
    pub hamming_field: HostRef,
    pub center_field: HostRef,
    pub corners_field: HostRef,
    pub pose_field: HostRef,
}

// Cached handles are only dereferenced by the host, under the bridge lock.
unsafe impl Send for HandleCache {}

impl HandleCache {
    /// Resolve every handle needed to build result objects.
    pub fn resolve(host: &Host) -> Result<Self, ResolveError> {
        let list_class = host
            .resolve_class(c"DetectionList")
            .ok_or(ResolveError::Class(LIST_CLASS))?;
        let list_ctor = host
            .resolve_method(list_class, c"<init>")
            .ok_or(ResolveError::Method {
                class: LIST_CLASS,
                name: "<init>",
            })?;
        let list_append = host
            .resolve_method(list_class, c"add")
            .ok_or(ResolveError::Method {
                class: LIST_CLASS,
                name: "add",
            })?;

        let record_class = host
            .resolve_class(c"Detection")
            .ok_or(ResolveError::Class(RECORD_CLASS))?;
        let record_ctor = host
            .resolve_method(record_class, c"<init>")
            .ok_or(ResolveError::Method {
                class: RECORD_CLASS,
                name: "<init>",
            })?;

        let field = |name: &'static str, handle: Option<HostRef>| {
            handle.ok_or(ResolveError::Field {
                class: RECORD_CLASS,
                name,
            })
        };
        let id_field = field("id", host.resolve_field(record_class, c"id"))?;
        let hamming_field = field("hamming", host.resolve_field(record_class, c"hamming"))?;
        let center_field = field("center", host.resolve_field(record_class, c"center"))?;
        let corners_field = field("corners", host.resolve_field(record_class, c"corners"))?;
        let pose_field = field("pose", host.resolve_field(record_class, c"pose"))?;

        Ok(Self {
            list_class,
            list_ctor,
            list_append,
            record_class,
            record_ctor,
            id_field,
            hamming_field,
            center_field,
            corners_field,
            pose_field,
        })
    }
}
