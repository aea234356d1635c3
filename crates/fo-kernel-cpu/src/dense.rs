use std::cmp::Ordering;

use fo_core::{
    ArrayData, Element, Numeric, OperatorClass, OperatorTag, Shape, TypedArray, broadcast_shape,
};

use crate::broadcast::BroadcastIter;
use crate::builder::store_numeric;
use crate::{
    KernelContext, KernelError, ResultBuilder, Side, dense_operand, elementwise_shape,
    shape_mismatch,
};

pub(crate) fn arithmetic<N: Numeric>(
    kernel: &'static str,
    op: OperatorTag,
    lhs: N,
    rhs: N,
) -> Result<N, KernelError> {
    match op {
        OperatorTag::Add => Ok(lhs.plus(rhs)),
        OperatorTag::Sub => Ok(lhs.minus(rhs)),
        OperatorTag::MulElementwise => Ok(lhs.times(rhs)),
        OperatorTag::DivElementwise => Ok(lhs.divide(rhs)),
        other => Err(KernelError::UnsupportedOperator { kernel, op: other }),
    }
}

pub(crate) fn relational<N: Numeric>(
    kernel: &'static str,
    op: OperatorTag,
    lhs: N,
    rhs: N,
) -> Result<bool, KernelError> {
    let ordering = lhs.compare(rhs);
    Ok(match op {
        OperatorTag::Lt => ordering == Some(Ordering::Less),
        OperatorTag::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        OperatorTag::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        OperatorTag::Gt => ordering == Some(Ordering::Greater),
        OperatorTag::Eq => lhs == rhs,
        OperatorTag::Ne => lhs != rhs,
        other => return Err(KernelError::UnsupportedOperator { kernel, op: other }),
    })
}

pub(crate) fn logical(
    kernel: &'static str,
    op: OperatorTag,
    lhs: bool,
    rhs: bool,
) -> Result<bool, KernelError> {
    Ok(match op {
        OperatorTag::And => lhs && rhs,
        OperatorTag::Or => lhs || rhs,
        OperatorTag::AndNot => lhs && !rhs,
        OperatorTag::OrNot => lhs || !rhs,
        OperatorTag::NotAnd => !lhs && rhs,
        OperatorTag::NotOr => !lhs || rhs,
        other => return Err(KernelError::UnsupportedOperator { kernel, op: other }),
    })
}

/// Evaluates an elementwise operator over broadcast column-major buffers.
///
/// Arithmetic results are stored into the planned kind; relational and
/// logical results are bool.
pub(crate) fn evaluate<L: Element, R: Element, N: Numeric>(
    kernel: &'static str,
    lhs: (&[L], &Shape),
    rhs: (&[R], &Shape),
    ctx: &KernelContext,
) -> Result<ArrayData, KernelError> {
    let (left, left_shape) = lhs;
    let (right, right_shape) = rhs;
    let pairs = BroadcastIter::new(left_shape, right_shape, &ctx.plan.shape);
    let op = ctx.op;
    match op.class() {
        OperatorClass::Arithmetic => {
            let guard = ctx.guards_zero_divisor();
            let mut out = Vec::with_capacity(pairs.len());
            for (index, (li, ri)) in pairs.enumerate() {
                let divisor: N = right[ri].lift();
                if guard && divisor.is_zero() {
                    return Err(KernelError::DivisionByZero { index });
                }
                out.push(arithmetic(kernel, op, left[li].lift::<N>(), divisor)?);
            }
            Ok(store_numeric(ctx.plan.kind, out))
        }
        OperatorClass::Relational => {
            let mut out = Vec::with_capacity(pairs.len());
            for (li, ri) in pairs {
                out.push(relational(
                    kernel,
                    op,
                    left[li].lift::<N>(),
                    right[ri].lift::<N>(),
                )?);
            }
            Ok(ArrayData::Bool(out))
        }
        OperatorClass::Logical => {
            let mut out = Vec::with_capacity(pairs.len());
            for (index, (li, ri)) in pairs.enumerate() {
                let a = left[li].truth().ok_or(KernelError::NanToLogical { index })?;
                let b = right[ri].truth().ok_or(KernelError::NanToLogical { index })?;
                out.push(logical(kernel, op, a, b)?);
            }
            Ok(ArrayData::Bool(out))
        }
    }
}

/// Dense elementwise kernel for every arithmetic, relational and logical operator
/// except the two matrix operators.
pub fn dense_elementwise<L: Element, R: Element, N: Numeric>(
    lhs: &TypedArray,
    rhs: &TypedArray,
    ctx: &KernelContext,
) -> Result<TypedArray, KernelError> {
    const KERNEL: &str = "dense_elementwise";
    let left = dense_operand::<L>(lhs, "lhs")?;
    let right = dense_operand::<R>(rhs, "rhs")?;
    if ctx.op.is_matrix_op() {
        return Err(KernelError::UnsupportedOperator {
            kernel: KERNEL,
            op: ctx.op,
        });
    }
    let shape = elementwise_shape(lhs, rhs)?;
    if shape != ctx.plan.shape {
        return Err(shape_mismatch(lhs, rhs));
    }
    let data = evaluate::<L, R, N>(KERNEL, (left, lhs.shape()), (right, rhs.shape()), ctx)?;
    ResultBuilder::new(&ctx.plan).finish_data(data)
}

/// Same-kind dense arithmetic written into `target`'s buffer.
///
/// `target` sits at `side`; `other` broadcasts into it. Nothing is written
/// when the call fails.
pub fn dense_elementwise_in_place<E: Element>(
    target: &mut TypedArray,
    other: &TypedArray,
    side: Side,
    ctx: &KernelContext,
) -> Result<(), KernelError> {
    const KERNEL: &str = "dense_elementwise_in_place";
    if ctx.op.class() != OperatorClass::Arithmetic || ctx.op.is_matrix_op() {
        return Err(KernelError::UnsupportedOperator {
            kernel: KERNEL,
            op: ctx.op,
        });
    }
    if target.kind() != E::KIND || !ResultBuilder::can_reuse(&ctx.plan, target) {
        return Err(KernelError::ReuseIneligible {
            reason: "target layout differs from the planned result",
        });
    }
    let theirs = dense_operand::<E>(other, side.other().label())?;
    let target_shape = target.shape().clone();
    let other_shape = other.shape().clone();
    let out = broadcast_shape(&target_shape, &other_shape).map_err(|_| match side {
        Side::Lhs => KernelError::ShapeMismatch {
            lhs: target_shape.clone(),
            rhs: other_shape.clone(),
        },
        Side::Rhs => KernelError::ShapeMismatch {
            lhs: other_shape.clone(),
            rhs: target_shape.clone(),
        },
    })?;
    if out != target_shape {
        return Err(KernelError::ReuseIneligible {
            reason: "operand broadcasts beyond the reused buffer",
        });
    }

    if ctx.guards_zero_divisor() {
        let mine = dense_operand::<E>(target, side.label())?;
        let pairs = BroadcastIter::new(&target_shape, &other_shape, &target_shape);
        for (index, (ti, oi)) in pairs.enumerate() {
            let divisor = match side {
                Side::Lhs => theirs[oi],
                Side::Rhs => mine[ti],
            };
            if divisor.is_zero() {
                return Err(KernelError::DivisionByZero { index });
            }
        }
    }

    let op = ctx.op;
    target
        .write_dense_in_place(|data| -> Result<(), KernelError> {
            let slots = E::slice_mut(data).ok_or(KernelError::ReuseIneligible {
                reason: "target buffer kind changed",
            })?;
            for (ti, oi) in BroadcastIter::new(&target_shape, &other_shape, &target_shape) {
                let mine = slots[ti].lift::<E::Natural>();
                let other_value = theirs[oi].lift::<E::Natural>();
                let (a, b) = match side {
                    Side::Lhs => (mine, other_value),
                    Side::Rhs => (other_value, mine),
                };
                slots[ti] = E::store(arithmetic(KERNEL, op, a, b)?);
            }
            Ok(())
        })
        .ok_or(KernelError::ReuseIneligible {
            reason: "target is not dense",
        })?
}
