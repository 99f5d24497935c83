//! Operator confirmation for name collisions.

use console::{Term, style};
use dialoguer::Confirm;

use crate::domain::models::Collision;
use crate::domain::ports::Confirmer;

/// Asks on the terminal. Declines when nobody is there to answer.
#[derive(Debug, Clone)]
pub struct ConsoleConfirmer {
    term: Term,
}

impl ConsoleConfirmer {
    /// Confirmer prompting on stderr.
    pub fn new() -> Self {
        Self { term: Term::stderr() }
    }
}

impl Default for ConsoleConfirmer {
    fn default() -> Self {
        Self::new()
    }
}

impl Confirmer for ConsoleConfirmer {
    fn confirm_collisions(&self, collisions: &[Collision]) -> bool {
        if !self.term.is_term() {
            tracing::warn!(
                count = collisions.len(),
                "collisions found and no terminal to confirm them"
            );
            return false;
        }

        let _ = self.term.write_line(&format!(
            "{} {} name collision(s):",
            style("warning:").yellow().bold(),
            collisions.len()
        ));
        for collision in collisions {
            let _ = self.term.write_line(&format!("  - {collision}"));
        }

        Confirm::new()
            .with_prompt("Install anyway? Later packs overwrite earlier ones")
            .default(false)
            .interact_on(&self.term)
            .unwrap_or(false)
    }
}

/// Fixed answer, for `--yes` and non-interactive runs.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirmer(pub bool);

impl Confirmer for AutoConfirmer {
    fn confirm_collisions(&self, collisions: &[Collision]) -> bool {
        tracing::info!(
            count = collisions.len(),
            accepted = self.0,
            "collisions answered automatically"
        );
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Namespace;

    #[test]
    fn test_auto_confirmer() {
        let collision = Collision {
            namespace: Namespace::ServerName,
            name: "docs".to_string(),
            candidate_pack: "b".to_string(),
            existing_pack: "a".to_string(),
        };
        assert!(AutoConfirmer(true).confirm_collisions(std::slice::from_ref(&collision)));
        assert!(!AutoConfirmer(false).confirm_collisions(&[collision]));
    }
}
