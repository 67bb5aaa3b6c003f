//! The ordered set of boolean expressions known to hold at the current
//! program point.

use crate::ast::Expr;
use crate::compile::CompilerError;
use crate::fingerprint::stable_fingerprint;

/// Decision returned for each fact during [`FactStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum FactUpdate {
    Keep,
    Replace(Expr),
    Discard,
}

#[derive(Debug, Clone, Default)]
pub struct FactStore {
    facts: Vec<(u128, Expr)>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Expr> + '_ {
        self.facts.iter().map(|(_, e)| e)
    }

    pub fn contains(&self, fact: &Expr) -> bool {
        let fp = stable_fingerprint(fact);
        self.facts.iter().any(|(h, e)| *h == fp && e == fact)
    }

    /// Appends `fact` unless an equal one is already present.
    pub fn push(&mut self, fact: Expr) -> bool {
        if self.contains(&fact) {
            return false;
        }
        let fp = stable_fingerprint(&fact);
        self.facts.push((fp, fact));
        true
    }

    /// Maps every fact through `decide` and swaps in the result. If `decide`
    /// fails for any fact the store is left exactly as it was.
    pub fn update<F>(&mut self, mut decide: F) -> Result<(), CompilerError>
    where
        F: FnMut(&Expr) -> Result<FactUpdate, CompilerError>,
    {
        let mut next: Vec<(u128, Expr)> = Vec::with_capacity(self.facts.len());
        for (fp, fact) in &self.facts {
            match decide(fact)? {
                FactUpdate::Keep => next.push((*fp, fact.clone())),
                FactUpdate::Replace(e) => next.push((stable_fingerprint(&e), e)),
                FactUpdate::Discard => {}
            }
        }
        self.facts = next;
        Ok(())
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Expr) -> bool) {
        self.facts.retain(|(_, e)| keep(e));
    }

    /// Drops every fact that mentions `e`, typically after `e` was assigned to.
    pub fn forget_mentions(&mut self, e: &Expr) {
        self.retain(|f| !f.mentions(e));
    }

    pub fn clear(&mut self) {
        self.facts.clear();
    }
}

impl FromIterator<Expr> for FactStore {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        let mut out = FactStore::new();
        for f in iter {
            out.push(f);
        }
        out
    }
}
