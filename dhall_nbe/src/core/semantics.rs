use std::rc::Rc;

use itertools::Itertools;

use super::{builtin, Builtin, Chunk, Const, Double, Fields, Index, Level, Op, Tm};
use crate::util::{Env, Name, RecField};

/// Values
///
/// Everything is reduced as far as it can be, except for the bodies of
/// binders, which are kept as closures until they are applied or quoted.
#[derive(Debug, Clone)]
pub enum Vtm {
    // Neutral terms
    Ntm { ntm: Ntm },

    Const { c: Const },
    /// A built-in, along with the arguments it has been applied to so far.
    /// A built-in holding all of its arguments is stuck.
    Builtin { builtin: Builtin, args: Vec<Vtm> },

    Lam { ty: Rc<Vtm>, body: Closure },
    Pi { ty: Rc<Vtm>, body: Closure },

    Bool { b: bool },
    Natural { n: u64 },
    Integer { i: i64 },
    Double { d: Double },
    /// Text, flattened so that no chunk is itself text
    Text { chunks: Vec<Chunk<Vtm>>, suffix: String },

    EmptyList { ty: Rc<Vtm> },
    NonEmptyList { vtms: Vec<Vtm> },
    Some { vtm: Rc<Vtm> },

    RecordType { fields: Fields<Vtm> },
    RecordLit { fields: Fields<Vtm> },
    UnionType { alts: Fields<Option<Vtm>> },

    Assert { ann: Rc<Vtm> },
}

/// Neutral terms, whose computation is blocked on something unknown
#[derive(Debug, Clone)]
pub enum Ntm {
    Free { name: Name },
    Local { name: Name, index: Index },
    /// Stands in for the binder of a closure that is being quoted
    Quote { name: Name, level: Level },

    App { head: Rc<Vtm>, arg: Rc<Vtm> },
    Op { op: Op, vtm0: Rc<Vtm>, vtm1: Rc<Vtm> },
    If { cond: Rc<Vtm>, vtm0: Rc<Vtm>, vtm1: Rc<Vtm> },

    /// Field selection. On a union type this is a constructor.
    Field { vtm: Rc<Vtm>, name: Name },
    Project { vtm: Rc<Vtm>, names: Vec<Name> },
    Merge {
        handler: Rc<Vtm>,
        union: Rc<Vtm>,
        ann: Option<Rc<Vtm>>,
    },
    ToMap { vtm: Rc<Vtm>, ann: Option<Rc<Vtm>> },
}

impl From<Ntm> for Vtm {
    fn from(ntm: Ntm) -> Self {
        Vtm::Ntm { ntm }
    }
}

/// The body of a binder, which explicitly captures its environment.
#[derive(Debug, Clone)]
pub struct Closure {
    name: Name,
    env: Env<Vtm>,
    body: Rc<Tm>,
}

impl Closure {
    pub fn new(name: &str, env: &Env<Vtm>, body: &Rc<Tm>) -> Closure {
        Closure {
            name: name.to_string(),
            env: env.clone(),
            body: body.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app(&self, arg: Vtm) -> Result<Vtm, EvalError> {
        eval(&self.env.with(&self.name, arg), &self.body)
    }
}

/// Terms the evaluator does not handle. These do not mean the term is
/// malformed; ill-scoped terms are a bug upstream and panic instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("cannot normalize the unresolved import `{import}`")]
    UnresolvedImport { import: String },
}

pub fn eval(env: &Env<Vtm>, tm: &Tm) -> Result<Vtm, EvalError> {
    match tm {
        Tm::Const { c } => Ok(Vtm::Const { c: *c }),
        Tm::Builtin { builtin } => Ok(Vtm::Builtin {
            builtin: *builtin,
            args: vec![],
        }),

        Tm::Var { name, index } => Ok(env.get(name, *index).clone()),
        Tm::Free { name } => Ok(Ntm::Free { name: name.clone() }.into()),
        Tm::Local { name, index } => Ok(Ntm::Local {
            name: name.clone(),
            index: *index,
        }
        .into()),

        Tm::Lam { name, ty, body } => Ok(Vtm::Lam {
            ty: Rc::new(eval(env, ty)?),
            body: Closure::new(name, env, body),
        }),
        Tm::Pi { name, ty, body } => Ok(Vtm::Pi {
            ty: Rc::new(eval(env, ty)?),
            body: Closure::new(name, env, body),
        }),
        Tm::App { head, arg } => app(eval(env, head)?, eval(env, arg)?),
        // bind the name and evaluate onwards
        Tm::Let {
            name, def, body, ..
        } => eval(&env.with(name, eval(env, def)?), body),
        Tm::Annot { tm, .. } => eval(env, tm),
        Tm::Op { op, tm0, tm1 } => Ok(op_app(*op, eval(env, tm0)?, eval(env, tm1)?)),

        Tm::BoolLit { b } => Ok(Vtm::Bool { b: *b }),
        Tm::NaturalLit { n } => Ok(Vtm::Natural { n: *n }),
        Tm::IntegerLit { i } => Ok(Vtm::Integer { i: *i }),
        Tm::DoubleLit { d } => Ok(Vtm::Double { d: *d }),
        Tm::TextLit { chunks, suffix } => {
            let chunks = chunks
                .iter()
                .map(|chunk| Ok(Chunk::new(chunk.prefix.clone(), eval(env, &chunk.data)?)))
                .collect::<Result<Vec<_>, EvalError>>()?;

            Ok(text(chunks, suffix))
        }

        Tm::EmptyList { ty } => Ok(Vtm::EmptyList {
            ty: Rc::new(eval(env, ty)?),
        }),
        Tm::NonEmptyList { tms } => Ok(Vtm::NonEmptyList {
            vtms: tms
                .iter()
                .map(|tm| eval(env, tm))
                .collect::<Result<Vec<_>, _>>()?,
        }),

        // only the branch that is taken gets evaluated
        Tm::If { cond, tm0, tm1 } => match eval(env, cond)? {
            Vtm::Bool { b: true } => eval(env, tm0),
            Vtm::Bool { b: false } => eval(env, tm1),
            cond => match (eval(env, tm0)?, eval(env, tm1)?) {
                (Vtm::Bool { b: true }, Vtm::Bool { b: false }) => Ok(cond),
                (vtm0, vtm1) => Ok(Ntm::If {
                    cond: Rc::new(cond),
                    vtm0: Rc::new(vtm0),
                    vtm1: Rc::new(vtm1),
                }
                .into()),
            },
        },
        Tm::Some { tm } => Ok(Vtm::Some {
            vtm: Rc::new(eval(env, tm)?),
        }),

        Tm::RecordType { fields } => Ok(Vtm::RecordType {
            fields: eval_fields(env, fields)?,
        }),
        Tm::RecordLit { fields } => Ok(Vtm::RecordLit {
            fields: eval_fields(env, fields)?,
        }),
        Tm::UnionType { alts } => Ok(Vtm::UnionType {
            alts: alts
                .iter()
                .map(|alt| {
                    let ty = alt.data.as_ref().map(|ty| eval(env, ty)).transpose()?;

                    Ok(RecField::new(alt.name.clone(), ty))
                })
                .collect::<Result<_, EvalError>>()?,
        }),
        Tm::Field { tm, name } => Ok(field(&eval(env, tm)?, name)),
        Tm::Project { tm, names } => Ok(project(&eval(env, tm)?, names)),
        Tm::Merge {
            handler,
            union,
            ann,
        } => merge(eval(env, handler)?, eval(env, union)?, eval_ann(env, ann)?),
        Tm::ToMap { tm, ann } => Ok(to_map(eval(env, tm)?, eval_ann(env, ann)?)),

        Tm::Assert { ann } => Ok(Vtm::Assert {
            ann: Rc::new(eval(env, ann)?),
        }),

        Tm::Import { import } => {
            tracing::warn!(%import, "unresolved import reached evaluation");

            Err(EvalError::UnresolvedImport {
                import: import.clone(),
            })
        }
    }
}

fn eval_fields(env: &Env<Vtm>, fields: &Fields<Tm>) -> Result<Fields<Vtm>, EvalError> {
    fields
        .iter()
        .map(|field| Ok(RecField::new(field.name.clone(), eval(env, &field.data)?)))
        .collect()
}

fn eval_ann(env: &Env<Vtm>, ann: &Option<Rc<Tm>>) -> Result<Option<Rc<Vtm>>, EvalError> {
    ann.as_ref()
        .map(|ann| eval(env, ann).map(Rc::new))
        .transpose()
}

/// Compute a function application
pub fn app(head: Vtm, arg: Vtm) -> Result<Vtm, EvalError> {
    match head {
        Vtm::Lam { body, .. } => body.app(arg),
        Vtm::Builtin { builtin, mut args } if args.len() < builtin.arity() => {
            args.push(arg);
            if args.len() < builtin.arity() {
                return Ok(Vtm::Builtin { builtin, args });
            }

            match builtin::reduce(builtin, &args)? {
                Some(vtm) => Ok(vtm),
                None => Ok(Vtm::Builtin { builtin, args }),
            }
        }
        head => Ok(Ntm::App {
            head: Rc::new(head),
            arg: Rc::new(arg),
        }
        .into()),
    }
}

/// Build a text value, splicing any interpolated text into the surrounding
/// literal. Text made of a single interpolation is just that value.
pub fn text(chunks: Vec<Chunk<Vtm>>, suffix: &str) -> Vtm {
    let mut out = vec![];
    let mut prefix = String::new();

    for Chunk { prefix: p, data } in chunks {
        prefix.push_str(&p);
        match data {
            Vtm::Text {
                chunks: inner,
                suffix: s,
            } => {
                for Chunk { prefix: p, data } in inner {
                    prefix.push_str(&p);
                    out.push(Chunk::new(std::mem::take(&mut prefix), data));
                }
                prefix.push_str(&s);
            }
            data => out.push(Chunk::new(std::mem::take(&mut prefix), data)),
        }
    }
    prefix.push_str(suffix);

    if prefix.is_empty() && out.len() == 1 && out[0].prefix.is_empty() {
        return out.remove(0).data;
    }

    Vtm::Text {
        chunks: out,
        suffix: prefix,
    }
}

fn op_app(op: Op, vtm0: Vtm, vtm1: Vtm) -> Vtm {
    use Vtm::{Bool, Natural};

    match (op, vtm0, vtm1) {
        (Op::Or, Bool { b: true }, _) | (Op::Or, _, Bool { b: true }) => Bool { b: true },
        (Op::Or, Bool { b: false }, vtm) | (Op::Or, vtm, Bool { b: false }) => vtm,

        (Op::And, Bool { b: false }, _) | (Op::And, _, Bool { b: false }) => Bool { b: false },
        (Op::And, Bool { b: true }, vtm) | (Op::And, vtm, Bool { b: true }) => vtm,

        (Op::Eq, Bool { b: b0 }, Bool { b: b1 }) => Bool { b: b0 == b1 },
        (Op::Eq, Bool { b: true }, vtm) | (Op::Eq, vtm, Bool { b: true }) => vtm,

        (Op::Ne, Bool { b: b0 }, Bool { b: b1 }) => Bool { b: b0 != b1 },
        (Op::Ne, Bool { b: false }, vtm) | (Op::Ne, vtm, Bool { b: false }) => vtm,

        (Op::Plus, Natural { n: n0 }, Natural { n: n1 }) => Natural {
            n: n0.saturating_add(n1),
        },
        (Op::Plus, Natural { n: 0 }, vtm) | (Op::Plus, vtm, Natural { n: 0 }) => vtm,

        (Op::Times, Natural { n: n0 }, Natural { n: n1 }) => Natural {
            n: n0.saturating_mul(n1),
        },
        (Op::Times, Natural { n: 0 }, _) | (Op::Times, _, Natural { n: 0 }) => Natural { n: 0 },
        (Op::Times, Natural { n: 1 }, vtm) | (Op::Times, vtm, Natural { n: 1 }) => vtm,

        // text appends always become interpolations, which flatten
        (Op::TextAppend, vtm0, vtm1) => text(
            vec![Chunk::new(String::new(), vtm0), Chunk::new(String::new(), vtm1)],
            "",
        ),

        (Op::ListAppend, Vtm::EmptyList { .. }, vtm) | (Op::ListAppend, vtm, Vtm::EmptyList { .. }) => {
            vtm
        }
        (Op::ListAppend, Vtm::NonEmptyList { vtms: vtms0 }, Vtm::NonEmptyList { vtms: vtms1 }) => {
            Vtm::NonEmptyList {
                vtms: vtms0.into_iter().chain(vtms1).collect(),
            }
        }

        (Op::Combine, Vtm::RecordLit { fields }, vtm) if fields.is_empty() => vtm,
        (Op::Combine, vtm, Vtm::RecordLit { fields }) if fields.is_empty() => vtm,
        (Op::Combine, Vtm::RecordLit { fields: fields0 }, Vtm::RecordLit { fields: fields1 }) => {
            Vtm::RecordLit {
                fields: merge_fields(fields0, fields1, |vtm0, vtm1| {
                    op_app(Op::Combine, vtm0, vtm1)
                }),
            }
        }

        (Op::CombineTypes, Vtm::RecordType { fields }, vtm) if fields.is_empty() => vtm,
        (Op::CombineTypes, vtm, Vtm::RecordType { fields }) if fields.is_empty() => vtm,
        (
            Op::CombineTypes,
            Vtm::RecordType { fields: fields0 },
            Vtm::RecordType { fields: fields1 },
        ) => Vtm::RecordType {
            fields: merge_fields(fields0, fields1, |vtm0, vtm1| {
                op_app(Op::CombineTypes, vtm0, vtm1)
            }),
        },

        (Op::Prefer, Vtm::RecordLit { fields }, vtm) if fields.is_empty() => vtm,
        (Op::Prefer, vtm, Vtm::RecordLit { fields }) if fields.is_empty() => vtm,
        (Op::Prefer, Vtm::RecordLit { fields: fields0 }, Vtm::RecordLit { fields: fields1 }) => {
            Vtm::RecordLit {
                fields: merge_fields(fields0, fields1, |_, vtm1| vtm1),
            }
        }

        (op, vtm0, vtm1) => Ntm::Op {
            op,
            vtm0: Rc::new(vtm0),
            vtm1: Rc::new(vtm1),
        }
        .into(),
    }
}

/// Union two sets of fields, using `both` on the fields they share. Fields
/// keep the order of the left side, followed by the new fields of the right.
fn merge_fields(
    fields0: Fields<Vtm>,
    fields1: Fields<Vtm>,
    both: impl Fn(Vtm, Vtm) -> Vtm,
) -> Fields<Vtm> {
    let right = fields1
        .iter()
        .filter(|field| !fields0.contains(&field.name))
        .cloned()
        .collect::<Vec<_>>();

    fields0
        .into_iter()
        .map(|field| match fields1.get(&field.name) {
            Some(vtm1) => RecField::new(field.name, both(field.data, vtm1.clone())),
            None => field,
        })
        .chain(right)
        .collect()
}

fn field(vtm: &Vtm, name: &str) -> Vtm {
    let stuck = || {
        Vtm::from(Ntm::Field {
            vtm: Rc::new(vtm.clone()),
            name: name.to_string(),
        })
    };

    match vtm {
        Vtm::RecordLit { fields } => fields.get(name).cloned().unwrap_or_else(stuck),
        Vtm::Ntm {
            ntm: Ntm::Project { vtm, .. },
        } => field(vtm, name),
        Vtm::Ntm {
            ntm: Ntm::Op { op, vtm0, vtm1 },
        } => match (op, vtm0.as_ref(), vtm1.as_ref()) {
            (Op::Prefer, _, Vtm::RecordLit { fields }) => match fields.get(name) {
                Some(vtm) => vtm.clone(),
                None => field(vtm0, name),
            },
            (Op::Prefer | Op::Combine, Vtm::RecordLit { fields }, _) if !fields.contains(name) => {
                field(vtm1, name)
            }
            (Op::Combine, _, Vtm::RecordLit { fields }) if !fields.contains(name) => {
                field(vtm0, name)
            }
            _ => stuck(),
        },
        _ => stuck(),
    }
}

fn project(vtm: &Vtm, names: &[Name]) -> Vtm {
    // labels are a set, so they are kept sorted
    let names: Vec<Name> = names.iter().cloned().sorted().dedup().collect();

    if names.is_empty() {
        return Vtm::RecordLit {
            fields: Fields::default(),
        };
    }

    match vtm {
        Vtm::RecordLit { fields } if names.iter().all(|name| fields.contains(name)) => {
            Vtm::RecordLit {
                fields: names
                    .iter()
                    .filter_map(|name| {
                        let vtm = fields.get(name)?;

                        Some(RecField::new(name.clone(), vtm.clone()))
                    })
                    .collect(),
            }
        }
        Vtm::Ntm {
            ntm: Ntm::Project { vtm, .. },
        } => project(vtm, &names),
        Vtm::Ntm {
            ntm:
                Ntm::Op {
                    op: Op::Prefer,
                    vtm0,
                    vtm1,
                },
        } if matches!(vtm1.as_ref(), Vtm::RecordLit { .. }) => {
            // take the names the literal provides from the literal,
            // and the rest from the left side
            let (right, left): (Vec<Name>, Vec<Name>) = names.iter().cloned().partition(|name| {
                matches!(vtm1.as_ref(), Vtm::RecordLit { fields } if fields.contains(name))
            });

            op_app(Op::Prefer, project(vtm0, &left), project(vtm1, &right))
        }
        _ => Ntm::Project {
            vtm: Rc::new(vtm.clone()),
            names,
        }
        .into(),
    }
}

fn merge(handler: Vtm, union: Vtm, ann: Option<Rc<Vtm>>) -> Result<Vtm, EvalError> {
    // a union constructor, `< A : T | .. >.A`
    fn constructor(vtm: &Vtm) -> Option<&str> {
        match vtm {
            Vtm::Ntm {
                ntm: Ntm::Field { vtm, name },
            } if matches!(vtm.as_ref(), Vtm::UnionType { .. }) => Some(name.as_str()),
            _ => None,
        }
    }

    if let Vtm::RecordLit { fields } = &handler {
        // the alternative that was picked, and the value it carries
        let alt = match &union {
            Vtm::Ntm {
                ntm: Ntm::App { head, arg },
            } => constructor(head).map(|name| (name, Some(arg.as_ref().clone()))),
            Vtm::Some { vtm } => Some(("Some", Some(vtm.as_ref().clone()))),
            Vtm::Builtin {
                builtin: Builtin::None,
                args,
            } if args.len() == 1 => Some(("None", None)),
            vtm => constructor(vtm).map(|name| (name, None)),
        };

        if let Some((name, arg)) = alt {
            if let Some(handler) = fields.get(name) {
                return match arg {
                    Some(arg) => app(handler.clone(), arg),
                    None => Ok(handler.clone()),
                };
            }
        }
    }

    Ok(Ntm::Merge {
        handler: Rc::new(handler),
        union: Rc::new(union),
        ann,
    }
    .into())
}

fn to_map(vtm: Vtm, ann: Option<Rc<Vtm>>) -> Vtm {
    if let Vtm::RecordLit { fields } = &vtm {
        if !fields.is_empty() {
            return Vtm::NonEmptyList {
                vtms: fields
                    .iter()
                    .sorted_by(|field0, field1| field0.name.cmp(&field1.name))
                    .map(|field| Vtm::RecordLit {
                        fields: Fields::new(vec![
                            RecField::new(
                                "mapKey".to_string(),
                                Vtm::Text {
                                    chunks: vec![],
                                    suffix: field.name.clone(),
                                },
                            ),
                            RecField::new("mapValue".to_string(), field.data.clone()),
                        ]),
                    })
                    .collect(),
            };
        }

        if let Some(ann) = &ann {
            return Vtm::EmptyList { ty: ann.clone() };
        }
    }

    Ntm::ToMap {
        vtm: Rc::new(vtm),
        ann,
    }
    .into()
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::{app, eval, Ntm, Vtm};
    use crate::{
        core::{Builtin, Tm},
        util::Env,
    };

    fn natural_even(n: u64) -> Tm {
        Tm::App {
            head: Rc::new(Tm::Builtin {
                builtin: Builtin::NaturalEven,
            }),
            arg: Rc::new(Tm::NaturalLit { n }),
        }
    }

    #[test]
    fn natural_even_four() {
        let vtm = eval(&Env::default(), &natural_even(4)).unwrap();

        assert!(matches!(vtm, Vtm::Bool { b: true }))
    }

    #[test]
    fn natural_even_three() {
        let vtm = eval(&Env::default(), &natural_even(3)).unwrap();

        assert!(matches!(vtm, Vtm::Bool { b: false }))
    }

    #[test]
    fn free_head_is_neutral() {
        let head: Vtm = Ntm::Free {
            name: "f".to_string(),
        }
        .into();
        let vtm = app(head, Vtm::Natural { n: 2 }).unwrap();

        assert!(matches!(
            vtm,
            Vtm::Ntm {
                ntm: Ntm::App { .. }
            }
        ))
    }

    #[test]
    fn partial_builtin_waits_for_arguments() {
        let head = Vtm::Builtin {
            builtin: Builtin::NaturalSubtract,
            args: vec![],
        };
        let vtm = app(head, Vtm::Natural { n: 2 }).unwrap();

        assert!(matches!(vtm, Vtm::Builtin { args, .. } if args.len() == 1))
    }

    #[test]
    fn untaken_branch_is_not_evaluated() {
        // the else branch would fail if it were evaluated
        let tm = Tm::If {
            cond: Rc::new(Tm::BoolLit { b: true }),
            tm0: Rc::new(Tm::NaturalLit { n: 1 }),
            tm1: Rc::new(Tm::Import {
                import: "./missing.dhall".to_string(),
            }),
        };

        assert!(matches!(
            eval(&Env::default(), &tm),
            Ok(Vtm::Natural { n: 1 })
        ))
    }

    #[test]
    fn lookup_uses_environment() {
        let env = Env::default().with("x", Vtm::Natural { n: 7 });
        let tm = Tm::Var {
            name: "x".to_string(),
            index: 0,
        };

        assert!(matches!(eval(&env, &tm), Ok(Vtm::Natural { n: 7 })))
    }
}
