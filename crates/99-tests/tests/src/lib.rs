//! Cross-crate tests for the applicator stack.

#[cfg(test)]
mod algorithms;

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod native_e2e;
