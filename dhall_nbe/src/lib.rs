// Normalization by evaluation for a Dhall-like language.
// Terms are evaluated into values, and values are quoted back into terms in
// normal form. Variables are named, and carry the number of binders of the
// same name between them and the binder they refer to.

pub mod core;
pub mod parse;
pub mod util;


use crate::core::{
    quote::{quote, QuoteCtx},
    semantics::{eval, EvalError},
    Tm,
};
use parse::{parse, ParseError};
use util::Env;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    ParseError(#[from] ParseError),
    #[error(transparent)]
    EvalError(#[from] EvalError),
}

/// The alpha-normal form of a term. Two terms are definitionally equal
/// exactly when their normal forms are equal.
pub fn normalize(tm: &Tm) -> Result<Tm, EvalError> {
    tracing::debug!(%tm, "normalizing");

    quote(&QuoteCtx::alpha(), &eval(&Env::default(), tm)?)
}

/// The normal form of a term, keeping the names of its binders
pub fn beta_normalize(tm: &Tm) -> Result<Tm, EvalError> {
    tracing::debug!(%tm, "beta normalizing");

    quote(&QuoteCtx::default(), &eval(&Env::default(), tm)?)
}

pub fn definitionally_equal(tm0: &Tm, tm1: &Tm) -> Result<bool, EvalError> {
    tracing::debug!(%tm0, %tm1, "comparing");

    Ok(normalize(tm0)? == normalize(tm1)?)
}

/// Parse some code and print its normal form
pub fn fully_normalize(code: &str) -> Result<String, Error> {
    let tm = parse(code)?;

    Ok(beta_normalize(&tm)?.to_string())
}
