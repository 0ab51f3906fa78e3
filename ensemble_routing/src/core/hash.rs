use std::hash::Hasher;
use wyhash::WyHash;

/// Maps a string onto `[0, max_value)`. Implementations must be deterministic across processes:
/// no per-process salt, no randomized seeds.
pub trait HashFunction: Send + Sync {
  fn hash(&self, value: &str, max_value: usize) -> usize;
}

/// The default [`HashFunction`], wyhash with a fixed zero seed.
#[derive(Clone, Copy, Debug, Default)]
pub struct WyHashFunction;
impl HashFunction for WyHashFunction {
  fn hash(&self, value: &str, max_value: usize) -> usize {
    if max_value == 0 {
      return 0;
    }
    (hash_code(value) % max_value as u64) as usize
  }
}

fn hash_code(value: &str) -> u64 {
  let mut hasher = WyHash::with_seed(0);
  hasher.write(value.as_bytes());
  hasher.finish()
}

#[test]
fn test_wyhash_function() {
  let hash = WyHashFunction;
  for max in [1usize, 7, 128, 1024].iter() {
    for i in 0..200 {
      let value = format!("bucket{}", i);
      let h = hash.hash(value.as_str(), *max);
      assert!(h < *max);
      assert_eq!(h, WyHashFunction.hash(value.as_str(), *max));
    }
  }
}

#[test]
fn test_wyhash_spreads_similar_inputs() {
  let hash = WyHashFunction;
  let mut buckets = vec![0u32; 16];
  for i in 0..1600 {
    buckets[hash.hash(format!("key{}", i).as_str(), 16)] += 1;
  }
  // 100 expected per bucket
  assert!(buckets.iter().all(|b| *b > 50 && *b < 150), "{:?}", buckets);
}
