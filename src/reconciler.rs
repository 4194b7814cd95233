//! Maps a batch function's output back onto the keys it was called with.

use std::collections::HashMap;
use std::hash::Hash;

use crate::{error::LoadError, future::Loaded};

/// Receives the side effects of reconciling a batch: counter increments and cache evictions.
pub(crate) trait BatchOutcomeSink<K>: Send + Sync {
    /// One key resolved with an error.
    fn key_failed(&self);

    /// The batch as a whole failed.
    fn batch_failed(&self);

    /// Evicts keys whose load failed. Per-key failures are only evicted when errors are not
    /// cached; whole-batch failures always are.
    fn evict(&self, keys: Vec<K>, whole_batch: bool);
}

/// List mode: the value at index `i` belongs to key `i`, so the lengths must agree.
pub(crate) fn reconcile_list<V>(
    key_count: usize,
    values: Vec<Loaded<V>>,
) -> Result<Vec<Loaded<V>>, LoadError> {
    if values.len() != key_count {
        return Err(LoadError::SizeMismatch { keys: key_count, values: values.len() });
    }
    Ok(values)
}

/// Map mode: keys missing from `values` resolve to `Ok(None)`. Repeated keys all receive the
/// same result.
pub(crate) fn reconcile_map<K, V>(keys: &[K], values: HashMap<K, Loaded<V>>) -> Vec<Loaded<V>>
where
    K: Eq + Hash,
    V: Clone,
{
    keys.iter().map(|k| values.get(k).cloned().unwrap_or(Ok(None))).collect::<Vec<_>>()
}

/// Splits `entries` into consecutive groups of at most `max_batch_size`.
pub(crate) fn partition<T>(entries: Vec<T>, max_batch_size: Option<usize>) -> Vec<Vec<T>> {
    match max_batch_size {
        Some(size) if size > 0 && size < entries.len() => {
            let mut groups = Vec::with_capacity((entries.len() + size - 1) / size);
            let mut entries = entries.into_iter().peekable();
            while entries.peek().is_some() {
                groups.push(entries.by_ref().take(size).collect::<Vec<_>>());
            }
            groups
        }
        _ if entries.is_empty() => Vec::new(),
        _ => vec![entries],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_mode_rejects_undercount() {
        let values: Vec<Loaded<&str>> = vec![Ok(Some("a")), Ok(Some("b"))];
        match reconcile_list(3, values) {
            Err(LoadError::SizeMismatch { keys, values }) => {
                assert_eq!((keys, values), (3, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn list_mode_keeps_per_key_errors_in_place() {
        let values: Vec<Loaded<&str>> = vec![Ok(Some("a")), Err(LoadError::msg("boom")), Ok(None)];
        let reconciled = reconcile_list(3, values).unwrap();
        assert!(matches!(reconciled[0], Ok(Some("a"))));
        assert_eq!(reconciled[1].as_ref().unwrap_err().to_string(), "boom");
        assert!(matches!(reconciled[2], Ok(None)));
    }

    #[test]
    fn map_mode_resolves_missing_keys_to_none() {
        let mut values = HashMap::new();
        values.insert("a", Ok(Some(1)));
        values.insert("c", Ok(Some(3)));
        values.insert("unrequested", Ok(Some(99)));

        let reconciled = reconcile_map(&["a", "b", "c", "a"], values);
        let reconciled = reconciled.into_iter().map(Result::unwrap).collect::<Vec<_>>();
        assert_eq!(reconciled, vec![Some(1), None, Some(3), Some(1)]);
    }

    #[test]
    fn partition_slices_in_order() {
        assert_eq!(partition(vec![1, 2, 3, 4, 5], Some(2)), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(partition(vec![1, 2, 3], Some(3)), vec![vec![1, 2, 3]]);
        assert_eq!(partition(vec![1, 2, 3], None), vec![vec![1, 2, 3]]);
        assert!(partition(Vec::<i32>::new(), Some(2)).is_empty());
    }
}
