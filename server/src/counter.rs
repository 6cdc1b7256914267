//! Demo application: sums integers emitted to it into a single dict
//! entry. Grounded on `examples/original_source/hive_test.go`'s
//! `testHiveHandler`, which exercises the exact same single-cell,
//! accumulate-into-state shape (spec.md §8 scenario 1).

use async_trait::async_trait;
use beehive_core::app::{Handler, MapContext, RcvContext};
use beehive_core::cell::{Cell, MappedCells};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "counter";
pub const MESSAGE_TYPE: &str = "add";
const DICT: &str = "D";
const KEY: &[u8] = b"0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Add(pub i64);

pub struct CounterHandler;

#[async_trait]
impl Handler for CounterHandler {
    type Msg = Add;

    fn map(&self, _msg: &Add, _ctx: &MapContext) -> Option<MappedCells> {
        Some(MappedCells::single(Cell::new(DICT, KEY)))
    }

    async fn rcv(&self, msg: Add, ctx: &RcvContext) -> anyhow::Result<()> {
        let dict = ctx.dict(DICT);
        let current: i64 = dict
            .get(KEY)
            .and_then(|v| serde_json::from_slice(&v).ok())
            .unwrap_or(0);
        let next = current + msg.0;
        dict.put(KEY.to_vec(), serde_json::to_vec(&next)?).await?;
        Ok(())
    }
}
