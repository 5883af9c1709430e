//! Stored-procedure invocation.
//!
//! A declared return kind takes the first call position and shifts the bound
//! inputs one position later. Every block the call produced is offered to the
//! processor in order until it asks to stop; the scalar is read afterwards.

use crate::db::connection::{Connection, ParamSlot, UNKNOWN_ROW_COUNT, accumulate_affected_rows};
use crate::db::handle::check_params;
use crate::error::{DbError, DbResult};
use crate::models::{ProcedureBlock, ProcedureCall, ProcedureResult, Value};
use tracing::debug;

/// Block processor; returns `false` to stop receiving blocks.
pub type BlockProcessor<'a> = dyn FnMut(ProcedureBlock) -> bool + Send + 'a;

/// Lay out call positions: the output slot first when a return kind is
/// declared, then the inputs.
pub(crate) fn call_slots(call: &ProcedureCall) -> Vec<ParamSlot<'_>> {
    let inputs = call
        .kinds
        .iter()
        .zip(&call.params)
        .map(|(&kind, value)| ParamSlot::In { kind, value });
    call.return_kind
        .map(ParamSlot::Out)
        .into_iter()
        .chain(inputs)
        .collect()
}

/// Run a procedure call and feed its blocks to `processor`.
pub(crate) async fn invoke(
    conn: &mut dyn Connection,
    call: &ProcedureCall,
    processor: &mut BlockProcessor<'_>,
) -> DbResult<Option<Value>> {
    check_params(&call.kinds, &call.params)?;
    let slots = call_slots(call);
    let raw = conn.call(&call.sql, &slots).await?;

    let total = raw.blocks.len();
    let mut delivered = 0;
    for block in raw.blocks {
        delivered += 1;
        if !processor(block) {
            break;
        }
    }
    debug!(
        sql = %call.sql,
        blocks = total,
        delivered,
        "Procedure results processed"
    );

    match call.return_kind {
        None => Ok(None),
        Some(kind) => raw.outputs.into_iter().next().map(Some).ok_or_else(|| {
            DbError::access(format!(
                "Procedure call declared a {} return value but none was reported",
                kind
            ))
        }),
    }
}

/// Run a procedure call and keep every block it produced.
pub(crate) async fn invoke_collect(
    conn: &mut dyn Connection,
    call: &ProcedureCall,
) -> DbResult<ProcedureResult> {
    let mut blocks = Vec::new();
    let returned = invoke(conn, call, &mut |block| {
        blocks.push(block);
        true
    })
    .await?;
    Ok(ProcedureResult {
        returned,
        affected_rows: procedure_affected_rows(&blocks),
        blocks,
    })
}

/// Lenient sum of the update counts, or [`UNKNOWN_ROW_COUNT`] without any.
fn procedure_affected_rows(blocks: &[ProcedureBlock]) -> i64 {
    let counts: Vec<i64> = blocks
        .iter()
        .filter_map(|block| match block {
            ProcedureBlock::UpdateCount(count) => Some(*count),
            ProcedureBlock::Rows(_) => None,
        })
        .collect();
    if counts.is_empty() {
        return UNKNOWN_ROW_COUNT;
    }
    i64::try_from(accumulate_affected_rows(&counts)).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueKind;

    #[test]
    fn test_return_kind_takes_first_slot() {
        let call = ProcedureCall::new("CALL add_item(?, ?)")
            .returning(ValueKind::Integer)
            .arg(ValueKind::Text, "widget");
        let slots = call_slots(&call);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0], ParamSlot::Out(ValueKind::Integer));
        assert!(matches!(
            slots[1],
            ParamSlot::In {
                kind: ValueKind::Text,
                ..
            }
        ));
    }

    #[test]
    fn test_inputs_start_first_without_return_kind() {
        let call = ProcedureCall::new("CALL touch(?)").arg(ValueKind::Integer, 7);
        let slots = call_slots(&call);
        assert_eq!(
            slots,
            vec![ParamSlot::In {
                kind: ValueKind::Integer,
                value: &Value::Integer(7)
            }]
        );
    }

    #[test]
    fn test_procedure_affected_rows() {
        assert_eq!(procedure_affected_rows(&[]), UNKNOWN_ROW_COUNT);
        assert_eq!(
            procedure_affected_rows(&[ProcedureBlock::Rows(vec![])]),
            UNKNOWN_ROW_COUNT
        );
        assert_eq!(
            procedure_affected_rows(&[
                ProcedureBlock::UpdateCount(2),
                ProcedureBlock::Rows(vec![]),
                ProcedureBlock::UpdateCount(UNKNOWN_ROW_COUNT),
            ]),
            3
        );
    }
}
