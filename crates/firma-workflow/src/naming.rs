// naming.rs
// Generadores de nombre de artefacto. Se inyectan para que los tests sean
// deterministas.
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub trait ArtifactNameGenerator: Send + Sync {
  fn next_name(&self) -> String;
}

/// UUID v4 con extensión `.pdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidNameGenerator;

impl ArtifactNameGenerator for UuidNameGenerator {
  fn next_name(&self) -> String {
    format!("{}.pdf", Uuid::new_v4())
  }
}

/// `<prefijo>-<n>.pdf` con `n` creciente desde 1.
#[derive(Debug)]
pub struct SequentialNameGenerator {
  prefix: String,
  counter: AtomicU64,
}

impl SequentialNameGenerator {
  pub fn new(prefix: &str) -> Self {
    Self { prefix: prefix.to_string(), counter: AtomicU64::new(0) }
  }
}

impl ArtifactNameGenerator for SequentialNameGenerator {
  fn next_name(&self) -> String {
    let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
    format!("{}-{}.pdf", self.prefix, n)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sequential_names() {
    let g = SequentialNameGenerator::new("doc");
    assert_eq!(g.next_name(), "doc-1.pdf");
    assert_eq!(g.next_name(), "doc-2.pdf");
  }

  #[test]
  fn uuid_names_are_unique() {
    let g = UuidNameGenerator;
    let a = g.next_name();
    assert!(a.ends_with(".pdf"));
    assert_ne!(a, g.next_name());
  }
}
