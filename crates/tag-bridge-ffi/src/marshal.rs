//! Converting detections into host-owned result objects.

use tag_bridge::Detection;

use crate::cache::HandleCache;
use crate::host::{Host, HostRef, TransientRef};

/// A host callback refused while building result objects.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    #[error("host failed to allocate a {0}")]
    Alloc(&'static str),

    #[error("host returned no {0} array")]
    Missing(&'static str),

    #[error("host rejected the {0} write")]
    Write(&'static str),
}

/// Build one host list containing one record per detection, in input order.
///
/// Each record carries the integer id and hamming distance plus three numeric
/// arrays: center `[x, y]`, corners `[x0, y0, .., x3, y3]` in the engine's
/// corner order, and the row-major 3x3 rotation. Transient references are
/// scoped to one loop iteration, so at most a handful are live at once no
/// matter how many detections arrive. On success the list reference is handed
/// to the caller unreleased; on failure everything acquired so far is
/// released.
pub fn marshal_detections(
    host: &Host,
    cache: &HandleCache,
    detections: &[Detection],
) -> Result<HostRef, MarshalError> {
    let list = TransientRef::new(
        host,
        host.new_object(cache.list_class, cache.list_ctor)
            .ok_or(MarshalError::Alloc("detection list"))?,
    );

    for det in detections {
        let record = TransientRef::new(
            host,
            host.new_object(cache.record_class, cache.record_ctor)
                .ok_or(MarshalError::Alloc("detection record"))?,
        );

        if !host.set_int_field(record.get(), cache.id_field, det.id) {
            return Err(MarshalError::Write("id"));
        }
        if !host.set_int_field(record.get(), cache.hamming_field, det.hamming) {
            return Err(MarshalError::Write("hamming"));
        }

        write_array(
            host,
            record.get(),
            cache.center_field,
            &[det.center.x, det.center.y],
            "center",
        )?;
        write_array(
            host,
            record.get(),
            cache.corners_field,
            &det.corners_flat(),
            "corners",
        )?;
        write_array(
            host,
            record.get(),
            cache.pose_field,
            &det.pose_row_major(),
            "pose",
        )?;

        if !host.append(list.get(), cache.list_append, record.get()) {
            return Err(MarshalError::Write("list append"));
        }
        // `record` drops here, before the next iteration.
    }

    Ok(list.into_raw())
}

fn write_array(
    host: &Host,
    record: HostRef,
    field: HostRef,
    values: &[f64],
    what: &'static str,
) -> Result<(), MarshalError> {
    let array = TransientRef::new(
        host,
        host.object_field(record, field)
            .ok_or(MarshalError::Missing(what))?,
    );
    if !host.write_f64_array(array.get(), values) {
        return Err(MarshalError::Write(what));
    }
    Ok(())
}
