use log::debug;

use super::oracle::FqnOracle;
use crate::config::ResolverConfig;

/// Constructor child that a class-like callee may own.
pub const CONSTRUCTOR_SUFFIX: &str = ".__init__";

/// Turns the external namespaces of a partial call graph into candidate
/// global node names.
pub struct ExternalResolver<'a> {
    config: &'a ResolverConfig,
    stdlib_prefixes: Vec<String>,
    oracle: &'a dyn FqnOracle,
    oracle_lookups: usize,
}

impl<'a> ExternalResolver<'a> {
    pub fn new(config: &'a ResolverConfig, oracle: &'a dyn FqnOracle) -> Self {
        let stdlib_prefixes = config
            .stdlib_modules
            .iter()
            .map(|m| format!("{m}."))
            .collect();
        Self {
            config,
            stdlib_prefixes,
            oracle,
            oracle_lookups: 0,
        }
    }

    /// `//pkg//pkg.mod.func` -> `pkg.mod.func`.
    pub fn external_name(namespace: &str) -> &str {
        namespace.rsplit("//").next().unwrap_or(namespace)
    }

    /// Builtins, standard-library names and known-unreliable prefixes are
    /// skipped rather than resolved.
    pub fn is_denied(&self, namespace: &str) -> bool {
        let name = Self::external_name(namespace);
        namespace.starts_with(&self.config.builtin_marker)
            || self.stdlib_prefixes.iter().any(|p| name.starts_with(p.as_str()))
            || self
                .config
                .unreliable_prefixes
                .iter()
                .any(|p| name.contains(p.as_str()))
    }

    /// The external name plus every variant with a trailing string-method
    /// attribute removed (`cfg.path.split` -> `cfg.path`).
    pub fn name_variants(&self, name: &str) -> Vec<String> {
        let mut variants = vec![name.to_string()];
        for suffix in &self.config.string_method_suffixes {
            if let Some(stripped) = name
                .strip_suffix(suffix.as_str())
                .and_then(|s| s.strip_suffix('.'))
            {
                if !stripped.is_empty() && !variants.iter().any(|v| v == stripped) {
                    variants.push(stripped.to_string());
                }
            }
        }
        variants
    }

    /// Names to try directly: each variant and its constructor child.
    pub fn direct_candidates(variants: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(variants.len() * 2);
        for v in variants {
            push_unique(&mut out, v.clone());
            push_unique(&mut out, format!("{v}{CONSTRUCTOR_SUFFIX}"));
        }
        out
    }

    /// Names derived from the oracle's canonical path of each variant.
    pub fn oracle_candidates(&mut self, variants: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for v in variants {
            self.oracle_lookups += 1;
            if let Some(fqn) = self.oracle.resolve(v) {
                debug!("FQN({v}) = {fqn}");
                let init = format!("{fqn}{CONSTRUCTOR_SUFFIX}");
                push_unique(&mut out, fqn);
                push_unique(&mut out, init);
            }
        }
        out
    }

    /// Questions put to the oracle so far. Repeats are answered by a
    /// [`MemoizedOracle`](super::oracle::MemoizedOracle) when one is injected.
    pub fn oracle_lookups(&self) -> usize {
        self.oracle_lookups
    }
}

fn push_unique(out: &mut Vec<String>, name: String) {
    if !out.contains(&name) {
        out.push(name);
    }
}
