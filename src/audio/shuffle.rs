use rand::Rng;

/// Devuelve una permutación aleatoria uniforme de `items` (Fisher–Yates).
///
/// Recorre desde el último índice hasta 1 e intercambia cada elemento con
/// uno elegido uniformemente entre los índices `<=` al actual.
pub fn shuffle<T: Clone>(items: &[T]) -> Vec<T> {
    let mut rng = rand::thread_rng();
    shuffle_with(items, &mut rng)
}

pub fn shuffle_with<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();
    for i in (1..shuffled.len()).rev() {
        let j = rng.gen_range(0..=i);
        shuffled.swap(i, j);
    }
    shuffled
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_shuffle_is_a_permutation() {
        let original: Vec<u32> = (0..50).collect();
        let mut shuffled = shuffle(&original);
        shuffled.sort_unstable();
        assert_eq!(shuffled, original);
    }

    #[test]
    fn test_shuffle_keeps_duplicates() {
        let original = vec!["a", "a", "b", "c", "c", "c"];
        let mut shuffled = shuffle(&original);
        shuffled.sort_unstable();
        assert_eq!(shuffled, original);
    }

    #[test]
    fn test_shuffle_changes_order() {
        let original = vec!['a', 'b', 'c', 'd', 'e', 'f', 'g'];
        let changed = (0..20).any(|_| shuffle(&original) != original);
        assert!(changed);
    }

    #[test]
    fn test_shuffle_small_inputs() {
        assert!(shuffle::<u8>(&[]).is_empty());
        assert_eq!(shuffle(&[7]), vec![7]);
    }

    #[test]
    fn test_shuffle_with_seed_is_deterministic() {
        let original: Vec<u32> = (0..10).collect();
        let a = shuffle_with(&original, &mut StdRng::seed_from_u64(42));
        let b = shuffle_with(&original, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_position_reachable() {
        // Con 3 elementos tienen que aparecer las 6 permutaciones
        let original = [1, 2, 3];
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(shuffle_with(&original, &mut rng));
        }
        assert_eq!(seen.len(), 6);
    }
}
