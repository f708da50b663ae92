use super::{
    semantics::{app, EvalError, Vtm},
    Builtin, Double,
};

fn text(s: String) -> Vtm {
    Vtm::Text {
        chunks: vec![],
        suffix: s,
    }
}

/// Reduce a built-in that has been given all of its arguments. Returns `None`
/// when the arguments are not literal enough for the built-in to compute.
pub fn reduce(builtin: Builtin, args: &[Vtm]) -> Result<Option<Vtm>, EvalError> {
    let vtm = match (builtin, args) {
        (Builtin::NaturalFold, [Vtm::Natural { n }, _, succ, zero]) => {
            let mut acc = zero.clone();
            for _ in 0..*n {
                acc = app(succ.clone(), acc)?;
            }
            acc
        }
        (Builtin::NaturalIsZero, [Vtm::Natural { n }]) => Vtm::Bool { b: *n == 0 },
        (Builtin::NaturalEven, [Vtm::Natural { n }]) => Vtm::Bool { b: n % 2 == 0 },
        (Builtin::NaturalOdd, [Vtm::Natural { n }]) => Vtm::Bool { b: n % 2 == 1 },
        (Builtin::NaturalShow, [Vtm::Natural { n }]) => text(n.to_string()),
        (Builtin::NaturalToInteger, [Vtm::Natural { n }]) => Vtm::Integer {
            i: i64::try_from(*n).unwrap_or(i64::MAX),
        },
        // `Natural/subtract m n` is `n - m`, stopping at zero
        (Builtin::NaturalSubtract, [Vtm::Natural { n: m }, Vtm::Natural { n }]) => Vtm::Natural {
            n: n.saturating_sub(*m),
        },
        (Builtin::NaturalSubtract, [Vtm::Natural { n: 0 }, vtm]) => vtm.clone(),
        (Builtin::NaturalSubtract, [_, Vtm::Natural { n: 0 }]) => Vtm::Natural { n: 0 },

        (Builtin::IntegerShow, [Vtm::Integer { i }]) if *i >= 0 => text(format!("+{i}")),
        (Builtin::IntegerShow, [Vtm::Integer { i }]) => text(i.to_string()),
        (Builtin::IntegerToDouble, [Vtm::Integer { i }]) => Vtm::Double {
            d: Double(*i as f64),
        },

        (Builtin::DoubleShow, [Vtm::Double { d }]) => text(d.to_string()),

        _ => return Ok(None),
    };

    tracing::trace!(%builtin, "reduced built-in");

    Ok(Some(vtm))
}

#[cfg(test)]
mod test {
    use super::reduce;
    use crate::core::{semantics::Vtm, Builtin, Double};

    fn shown(vtm: Option<Vtm>) -> Option<String> {
        match vtm {
            Some(Vtm::Text { chunks, suffix }) if chunks.is_empty() => Some(suffix),
            _ => None,
        }
    }

    #[test]
    fn subtract_saturates() {
        let vtm = reduce(
            Builtin::NaturalSubtract,
            &[Vtm::Natural { n: 5 }, Vtm::Natural { n: 3 }],
        )
        .unwrap();

        assert!(matches!(vtm, Some(Vtm::Natural { n: 0 })))
    }

    #[test]
    fn subtract_zero_is_identity() {
        let vtm = reduce(
            Builtin::NaturalSubtract,
            &[Vtm::Natural { n: 0 }, Vtm::Bool { b: true }],
        )
        .unwrap();

        assert!(matches!(vtm, Some(Vtm::Bool { b: true })))
    }

    #[test]
    fn integer_show_keeps_sign() {
        let pos = reduce(Builtin::IntegerShow, &[Vtm::Integer { i: 3 }]).unwrap();
        let neg = reduce(Builtin::IntegerShow, &[Vtm::Integer { i: -3 }]).unwrap();

        assert_eq!(shown(pos), Some("+3".to_string()));
        assert_eq!(shown(neg), Some("-3".to_string()))
    }

    #[test]
    fn double_show() {
        let vtm = reduce(Builtin::DoubleShow, &[Vtm::Double { d: Double(1.0) }]).unwrap();

        assert_eq!(shown(vtm), Some("1.0".to_string()))
    }

    #[test]
    fn stuck_on_non_literal() {
        let vtm = reduce(Builtin::NaturalIsZero, &[Vtm::Bool { b: false }]).unwrap();

        assert!(vtm.is_none())
    }
}
