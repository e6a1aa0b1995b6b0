use ebml_tags_specification::EbmlSpecification;

///
/// Returns whether or not the `test_id` is an ancestor of `current_id`.
///
pub fn is_parent<TSpec: EbmlSpecification>(current_id: u64, test_id: u64) -> bool {
    TSpec::get_path(current_id).contains(&test_id)
}

///
/// Returns whether or not the `test_id` is a sibling of `current_id`.
///
/// A sibling element is one which shares the same path.  A separate instance of the current element counts as a sibling.  Ids missing from the schema have no known path and are never siblings.
///
pub fn is_sibling<TSpec: EbmlSpecification>(current_id: u64, test_id: u64) -> bool {
    match (TSpec::get_element(current_id), TSpec::get_element(test_id)) {
        (Some(current), Some(test)) => !test.global && current.path == test.path,
        _ => false,
    }
}

///
/// Returns whether or not the `test_id` would end this "Unknown" sized `current_id`.
///
/// Regarding this method, unknown sized elements can be ended if we reach an element that is:
///  - A parent of the element
///  - A direct sibling of the element
///  - A Root element
///
/// Global elements (Void, CRC-32) and ids the schema does not know never end an element.  There are a couple of other cases where an Unknown sized element can end, but they rely on knowing document position and sizes.  More details can be found in the [EBML RFC](https://www.rfc-editor.org/rfc/rfc8794.html#name-unknown-data-size).
///
pub fn is_ended_by<TSpec: EbmlSpecification>(current_id: u64, test_id: u64) -> bool {
    match TSpec::get_element(test_id) {
        None => false,
        Some(test) if test.global => false,
        Some(test) => {
            is_parent::<TSpec>(current_id, test_id) || // parent
            is_sibling::<TSpec>(current_id, test_id) || // sibling
            test.is_root() // Root element
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebml_tags_specification::matroska::Matroska;

    #[test]
    fn cluster_is_ended_by_next_cluster() {
        assert!(is_ended_by::<Matroska>(Matroska::Cluster.id(), Matroska::Cluster.id()));
        assert!(is_ended_by::<Matroska>(Matroska::Cluster.id(), Matroska::Tags.id()));
    }

    #[test]
    fn segment_is_ended_by_root_only() {
        assert!(is_ended_by::<Matroska>(Matroska::Segment.id(), Matroska::Ebml.id()));
        assert!(is_ended_by::<Matroska>(Matroska::Segment.id(), Matroska::Segment.id()));
        assert!(!is_ended_by::<Matroska>(Matroska::Segment.id(), Matroska::Tags.id()));
    }

    #[test]
    fn children_do_not_end_parent() {
        assert!(!is_ended_by::<Matroska>(Matroska::Cluster.id(), Matroska::SimpleBlock.id()));
        assert!(is_ended_by::<Matroska>(Matroska::SimpleBlock.id(), Matroska::Cluster.id()));
    }

    #[test]
    fn globals_and_unknown_ids_never_end() {
        assert!(!is_ended_by::<Matroska>(Matroska::Cluster.id(), Matroska::Void.id()));
        assert!(!is_ended_by::<Matroska>(Matroska::Cluster.id(), Matroska::Crc32.id()));
        assert!(!is_ended_by::<Matroska>(Matroska::Segment.id(), 0x4F));
        assert!(!is_sibling::<Matroska>(Matroska::Segment.id(), 0x4F));
    }
}
