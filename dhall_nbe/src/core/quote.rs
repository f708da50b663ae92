use std::{collections::HashMap, rc::Rc};

use super::{
    semantics::{Closure, EvalError, Ntm, Vtm},
    Chunk, Fields, Index, Level, Tm,
};
use crate::util::{Name, RecField};

/// The binders quotation has passed under, counted per name.
#[derive(Debug, Clone, Default)]
pub struct QuoteCtx {
    counts: HashMap<Name, usize>,
    // when set, every binder is renamed to `_`
    alpha: bool,
}

impl QuoteCtx {
    /// A context that produces alpha-normal terms
    pub fn alpha() -> QuoteCtx {
        QuoteCtx {
            counts: HashMap::new(),
            alpha: true,
        }
    }

    /// The number of binders called `name` passed so far
    pub fn get(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn with(&self, name: &str) -> QuoteCtx {
        let mut counts = self.counts.clone();
        *counts.entry(name.to_string()).or_insert(0) += 1;

        QuoteCtx {
            counts,
            alpha: self.alpha,
        }
    }

    fn binder<'a>(&self, name: &'a str) -> &'a str {
        if self.alpha {
            "_"
        } else {
            name
        }
    }
}

fn level_to_index(name: &str, size: usize, level: Level) -> Index {
    match size.checked_sub(level + 1) {
        Some(index) => index,
        None => panic!("placeholder {name} at level {level} escaped its binder?!"),
    }
}

/// Read a value back into a term in normal form
pub fn quote(ctx: &QuoteCtx, vtm: &Vtm) -> Result<Tm, EvalError> {
    let rc = |vtm: &Vtm| quote(ctx, vtm).map(Rc::new);

    let tm = match vtm {
        Vtm::Ntm { ntm } => quote_ntm(ctx, ntm)?,

        Vtm::Const { c } => Tm::Const { c: *c },
        Vtm::Builtin { builtin, args } => {
            args.iter()
                .try_fold(Tm::Builtin { builtin: *builtin }, |head, arg| {
                    Ok::<_, EvalError>(Tm::App {
                        head: Rc::new(head),
                        arg: rc(arg)?,
                    })
                })?
        }

        Vtm::Lam { ty, body } => {
            let (name, body) = quote_closure(ctx, body)?;
            Tm::Lam {
                name,
                ty: rc(ty)?,
                body,
            }
        }
        Vtm::Pi { ty, body } => {
            let (name, body) = quote_closure(ctx, body)?;
            Tm::Pi {
                name,
                ty: rc(ty)?,
                body,
            }
        }

        Vtm::Bool { b } => Tm::BoolLit { b: *b },
        Vtm::Natural { n } => Tm::NaturalLit { n: *n },
        Vtm::Integer { i } => Tm::IntegerLit { i: *i },
        Vtm::Double { d } => Tm::DoubleLit { d: *d },
        Vtm::Text { chunks, suffix } => Tm::TextLit {
            chunks: chunks
                .iter()
                .map(|chunk| Ok(Chunk::new(chunk.prefix.clone(), quote(ctx, &chunk.data)?)))
                .collect::<Result<_, EvalError>>()?,
            suffix: suffix.clone(),
        },

        Vtm::EmptyList { ty } => Tm::EmptyList { ty: rc(ty)? },
        Vtm::NonEmptyList { vtms } => Tm::NonEmptyList {
            tms: vtms
                .iter()
                .map(|vtm| quote(ctx, vtm))
                .collect::<Result<_, _>>()?,
        },
        Vtm::Some { vtm } => Tm::Some { tm: rc(vtm)? },

        Vtm::RecordType { fields } => Tm::RecordType {
            fields: quote_fields(ctx, fields)?,
        },
        Vtm::RecordLit { fields } => Tm::RecordLit {
            fields: quote_fields(ctx, fields)?,
        },
        Vtm::UnionType { alts } => Tm::UnionType {
            alts: alts
                .iter()
                .map(|alt| {
                    let ty = alt.data.as_ref().map(|ty| quote(ctx, ty)).transpose()?;

                    Ok(RecField::new(alt.name.clone(), ty))
                })
                .collect::<Result<_, EvalError>>()?,
        },

        Vtm::Assert { ann } => Tm::Assert { ann: rc(ann)? },
    };

    Ok(tm)
}

fn quote_ntm(ctx: &QuoteCtx, ntm: &Ntm) -> Result<Tm, EvalError> {
    let rc = |vtm: &Vtm| quote(ctx, vtm).map(Rc::new);
    let rc_ann = |ann: &Option<Rc<Vtm>>| ann.as_ref().map(|ann| rc(ann)).transpose();

    let tm = match ntm {
        Ntm::Free { name } => Tm::Free { name: name.clone() },
        Ntm::Local { name, index } => Tm::Local {
            name: name.clone(),
            index: *index,
        },
        Ntm::Quote { name, level } => Tm::Var {
            name: name.clone(),
            index: level_to_index(name, ctx.get(name), *level),
        },

        Ntm::App { head, arg } => Tm::App {
            head: rc(head)?,
            arg: rc(arg)?,
        },
        Ntm::Op { op, vtm0, vtm1 } => Tm::Op {
            op: *op,
            tm0: rc(vtm0)?,
            tm1: rc(vtm1)?,
        },
        Ntm::If { cond, vtm0, vtm1 } => Tm::If {
            cond: rc(cond)?,
            tm0: rc(vtm0)?,
            tm1: rc(vtm1)?,
        },

        Ntm::Field { vtm, name } => Tm::Field {
            tm: rc(vtm)?,
            name: name.clone(),
        },
        Ntm::Project { vtm, names } => Tm::Project {
            tm: rc(vtm)?,
            names: names.clone(),
        },
        Ntm::Merge {
            handler,
            union,
            ann,
        } => Tm::Merge {
            handler: rc(handler)?,
            union: rc(union)?,
            ann: rc_ann(ann)?,
        },
        Ntm::ToMap { vtm, ann } => Tm::ToMap {
            tm: rc(vtm)?,
            ann: rc_ann(ann)?,
        },
    };

    Ok(tm)
}

/// Apply a closure to a placeholder for its own binder, and quote the result
/// one binder deeper.
fn quote_closure(ctx: &QuoteCtx, body: &Closure) -> Result<(Name, Rc<Tm>), EvalError> {
    let name = ctx.binder(body.name());
    let placeholder = Ntm::Quote {
        name: name.to_string(),
        level: ctx.get(name),
    };
    let body = body.app(placeholder.into())?;

    Ok((name.to_string(), Rc::new(quote(&ctx.with(name), &body)?)))
}

fn quote_fields(ctx: &QuoteCtx, fields: &Fields<Vtm>) -> Result<Fields<Tm>, EvalError> {
    fields
        .iter()
        .map(|field| Ok(RecField::new(field.name.clone(), quote(ctx, &field.data)?)))
        .collect()
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::{quote, QuoteCtx};
    use crate::{
        core::{
            semantics::{eval, Ntm, Vtm},
            Builtin, Const, Tm,
        },
        util::Env,
    };

    fn var(name: &str, index: usize) -> Tm {
        Tm::Var {
            name: name.to_string(),
            index,
        }
    }

    fn lam(name: &str, body: Tm) -> Tm {
        Tm::Lam {
            name: name.to_string(),
            ty: Rc::new(Tm::Const { c: Const::Type }),
            body: Rc::new(body),
        }
    }

    #[test]
    fn counts_are_per_name() {
        let ctx = QuoteCtx::default().with("x").with("y").with("x");

        assert_eq!((ctx.get("x"), ctx.get("y"), ctx.get("z")), (2, 1, 0))
    }

    #[test]
    fn shadowed_binder_keeps_index() {
        // λ(x : Type) → λ(x : Type) → x@1
        let tm = lam("x", lam("x", var("x", 1)));
        let vtm = eval(&Env::default(), &tm).unwrap();

        assert_eq!(quote(&QuoteCtx::default(), &vtm).unwrap(), tm)
    }

    #[test]
    fn alpha_renames_binders() {
        // λ(x : Type) → λ(y : Type) → x
        let tm = lam("x", lam("y", var("x", 0)));
        let vtm = eval(&Env::default(), &tm).unwrap();

        insta::assert_snapshot!(
            quote(&QuoteCtx::alpha(), &vtm).unwrap(),
            @"λ(_ : Type) → λ(_ : Type) → _@1"
        )
    }

    #[test]
    fn builtin_spine() {
        let vtm = Vtm::Builtin {
            builtin: Builtin::NaturalSubtract,
            args: vec![Ntm::Free {
                name: "n".to_string(),
            }
            .into()],
        };

        insta::assert_snapshot!(quote(&QuoteCtx::default(), &vtm).unwrap(), @"Natural/subtract n")
    }

    #[test]
    #[should_panic]
    fn escaped_placeholder() {
        let vtm: Vtm = Ntm::Quote {
            name: "x".to_string(),
            level: 0,
        }
        .into();

        let _ = quote(&QuoteCtx::default(), &vtm);
    }
}
