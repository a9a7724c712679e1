use crate::types::{Candle, CandleInterval};

/// Aggregates source-interval candles into a larger target interval.
///
/// Buckets are aligned to `floor(t / target_ms) * target_ms`; open is the
/// first bar's open, high/low the extremes, close the last bar's close,
/// volume and trade count summed. If the target is not strictly larger than
/// the source the input is returned unchanged.
pub fn aggregate_candles(
    candles: &[Candle],
    source: CandleInterval,
    target: CandleInterval,
) -> Vec<Candle> {
    let target_ms = target.millis();
    if target_ms <= source.millis() {
        return candles.to_vec();
    }

    let mut out: Vec<Candle> = Vec::new();
    let mut bucket: Option<Candle> = None;

    for candle in candles {
        let bucket_t = (candle.t / target_ms) * target_ms;
        match bucket.as_mut() {
            Some(current) if current.t == bucket_t => {
                current.h = current.h.max(candle.h);
                current.l = current.l.min(candle.l);
                current.c = candle.c;
                current.v += candle.v;
                current.n += candle.n;
            }
            _ => {
                if let Some(done) = bucket.take() {
                    out.push(done);
                }
                bucket = Some(Candle {
                    t: bucket_t,
                    o: candle.o,
                    h: candle.h,
                    l: candle.l,
                    c: candle.c,
                    v: candle.v,
                    n: candle.n,
                });
            }
        }
    }

    if let Some(done) = bucket {
        out.push(done);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute_candle(minute: i64, px: f64) -> Candle {
        Candle {
            t: minute * 60_000,
            o: px,
            h: px + 2.0,
            l: px - 2.0,
            c: px + 1.0,
            v: 10.0,
            n: 3,
        }
    }

    #[test]
    fn aggregates_whole_multiple() {
        let candles: Vec<Candle> = (0..10).map(|i| minute_candle(i, 100.0 + i as f64)).collect();
        let agg = aggregate_candles(&candles, CandleInterval::M1, CandleInterval::M5);

        assert_eq!(agg.len(), 2);
        let first = &agg[0];
        assert_eq!(first.t, 0);
        assert_eq!(first.o, 100.0);
        assert_eq!(first.c, 105.0); // last bar of bucket closes at 104 + 1
        assert_eq!(first.h, 106.0); // high of minute 4
        assert_eq!(first.l, 98.0);
        assert_eq!(first.v, 50.0);
        assert_eq!(first.n, 15);

        assert_eq!(agg[1].t, 5 * 60_000);
    }

    #[test]
    fn bucket_alignment_is_floor_of_timestamp() {
        // Start mid-bucket: minute 3 belongs to bucket 0, minute 5 opens bucket 1.
        let candles = vec![minute_candle(3, 100.0), minute_candle(5, 200.0)];
        let agg = aggregate_candles(&candles, CandleInterval::M1, CandleInterval::M5);
        assert_eq!(agg.len(), 2);
        assert_eq!(agg[0].t, 0);
        assert_eq!(agg[1].t, 5 * 60_000);
    }

    #[test]
    fn same_or_smaller_target_returns_input() {
        let candles: Vec<Candle> = (0..4).map(|i| minute_candle(i, 100.0)).collect();
        let same = aggregate_candles(&candles, CandleInterval::M5, CandleInterval::M5);
        assert_eq!(same, candles);
        let smaller = aggregate_candles(&candles, CandleInterval::H1, CandleInterval::M5);
        assert_eq!(smaller, candles);
    }
}
