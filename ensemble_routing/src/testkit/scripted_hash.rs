use crate::core::{HashFunction, WyHashFunction};
use std::collections::HashMap;

/// A [`HashFunction`] answering from a script. Values missing from the script fall back to
/// [`WyHashFunction`]. Scripted answers are reduced modulo `max_value`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedHash {
  script: HashMap<String, usize>,
}
impl ScriptedHash {
  pub fn new<I: IntoIterator<Item = (String, usize)>>(script: I) -> ScriptedHash {
    ScriptedHash {
      script: script.into_iter().collect(),
    }
  }
}
impl HashFunction for ScriptedHash {
  fn hash(&self, value: &str, max_value: usize) -> usize {
    match self.script.get(value) {
      Some(_) if max_value == 0 => 0,
      Some(h) => h % max_value,
      None => WyHashFunction.hash(value, max_value),
    }
  }
}

#[test]
fn test_scripted_hash() {
  let hash = ScriptedHash::new(vec![("a".to_string(), 3), ("b".to_string(), 9)]);
  assert_eq!(hash.hash("a", 5), 3);
  assert_eq!(hash.hash("b", 5), 4);
  assert_eq!(hash.hash("c", 5), WyHashFunction.hash("c", 5));
}
