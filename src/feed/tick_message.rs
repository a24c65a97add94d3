//! 上游行情消息解析
//!
//! 消息格式：`{"type":"tick","asset":"EURUSD","data":{"price":1.1,"time":1700000000}}`。
//! 非 tick 类型与任何字段缺失、非法的消息都返回 `None`，由调用方静默丢弃。
//! 品种名会拼进文件名，时间会参与分桶运算，两者都在这里做范围检查。

use crate::common::{is_safe_asset_name, Tick, MAX_TICK_TIME_SECS};
use serde::Deserialize;

/// 订阅全部品种的请求
pub const SUBSCRIBE_ALL_MESSAGE: &str = r#"{"type":"subscribe_all"}"#;

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    asset: Option<String>,
    data: Option<RawTickData>,
}

#[derive(Debug, Deserialize)]
struct RawTickData {
    price: Option<f64>,
    time: Option<f64>,
}

/// 解析一帧消息为Tick
pub fn parse_tick_message(payload: &[u8]) -> Option<Tick> {
    let raw: RawMessage = serde_json::from_slice(payload).ok()?;
    if raw.kind.as_deref() != Some("tick") {
        return None;
    }

    let asset = raw.asset.filter(|asset| is_safe_asset_name(asset))?;
    let data = raw.data?;
    let price = data.price.filter(|price| price.is_finite())?;
    // 先在浮点上检查范围，避免转换时饱和成 i64 极值
    let time = data
        .time
        .map(f64::floor)
        .filter(|time| (0.0..=MAX_TICK_TIME_SECS as f64).contains(time))?;

    Some(Tick::new(asset, price, time as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_tick() {
        let tick = parse_tick_message(br#"{"type":"tick","asset":"EURUSD","data":{"price":1.0855,"time":1700000061}}"#);
        assert_eq!(tick, Some(Tick::new("EURUSD", 1.0855, 1700000061)));
    }

    #[test]
    fn test_fractional_time_is_floored() {
        let tick = parse_tick_message(br#"{"type":"tick","asset":"X","data":{"price":2,"time":119.9}}"#).unwrap();
        assert_eq!(tick.time, 119);
        assert_eq!(tick.price, 2.0);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let tick = parse_tick_message(
            br#"{"type":"tick","asset":"X","source":"otc","data":{"price":1.5,"time":60,"volume":3}}"#,
        );
        assert_eq!(tick, Some(Tick::new("X", 1.5, 60)));
    }

    #[test]
    fn test_time_range_bounds() {
        let max = format!(
            r#"{{"type":"tick","asset":"X","data":{{"price":1.0,"time":{}}}}}"#,
            MAX_TICK_TIME_SECS
        );
        assert_eq!(parse_tick_message(max.as_bytes()).unwrap().time, MAX_TICK_TIME_SECS);
        assert_eq!(
            parse_tick_message(br#"{"type":"tick","asset":"X","data":{"price":1.0,"time":0.5}}"#).unwrap().time,
            0
        );
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let cases: &[&[u8]] = &[
            b"not json",
            br#"{"type":"subscribed","count":12}"#,
            br#"{"asset":"X","data":{"price":1.0,"time":0}}"#,
            br#"{"type":"tick","data":{"price":1.0,"time":0}}"#,
            br#"{"type":"tick","asset":"","data":{"price":1.0,"time":0}}"#,
            br#"{"type":"tick","asset":"X"}"#,
            br#"{"type":"tick","asset":"X","data":{"time":0}}"#,
            br#"{"type":"tick","asset":"X","data":{"price":1.0}}"#,
            br#"{"type":"tick","asset":"X","data":{"price":"1.0","time":0}}"#,
            br#"{"type":"tick","asset":"X","data":{"price":1e400,"time":0}}"#,
            br#"{"type":"tick","asset":"X","data":{"price":1.0,"time":-1e30}}"#,
            br#"{"type":"tick","asset":"X","data":{"price":1.0,"time":1e300}}"#,
            br#"{"type":"tick","asset":"X","data":{"price":1.0,"time":-1}}"#,
            br#"{"type":"tick","asset":"../escaped","data":{"price":1.0,"time":0}}"#,
            br#"{"type":"tick","asset":"a/b","data":{"price":1.0,"time":0}}"#,
            br#"{"type":"tick","asset":"..","data":{"price":1.0,"time":0}}"#,
        ];
        for payload in cases {
            assert_eq!(parse_tick_message(payload), None, "{}", String::from_utf8_lossy(payload));
        }
    }
}
