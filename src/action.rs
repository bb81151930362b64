use crate::error::{Result, SimError};

/// Width of the controller's action vector: `[direction, magnitude]`.
pub const ACTION_WIDTH: usize = 2;

const SELL_BELOW: f64 = 0.33;
const BUY_FROM: f64 = 0.66;

/// What the controller wants to do this step. The magnitude is a fraction
/// of balance for a buy and of holding for a sell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TradeIntent {
    Sell(f64),
    Hold,
    Buy(f64),
}

/// Maps a raw controller output to a trade intent. The magnitude is passed
/// through untouched; the simulator owns clamping. Only a NaN direction falls
/// outside the bands and is read as a hold.
pub fn decode(action: &[f64]) -> Result<TradeIntent> {
    let [direction, magnitude] = action else {
        return Err(SimError::InvalidActionShape {
            expected: ACTION_WIDTH,
            got: action.len(),
        });
    };

    let intent = if direction.is_nan() {
        TradeIntent::Hold
    } else if *direction < SELL_BELOW {
        TradeIntent::Sell(*magnitude)
    } else if *direction < BUY_FROM {
        TradeIntent::Hold
    } else {
        TradeIntent::Buy(*magnitude)
    };
    Ok(intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_bands() {
        assert_eq!(decode(&[0.0, 0.7]).unwrap(), TradeIntent::Sell(0.7));
        assert_eq!(decode(&[0.3299, 0.1]).unwrap(), TradeIntent::Sell(0.1));
        assert_eq!(decode(&[0.33, 0.9]).unwrap(), TradeIntent::Hold);
        assert_eq!(decode(&[0.6599, 0.9]).unwrap(), TradeIntent::Hold);
        assert_eq!(decode(&[0.66, 0.9]).unwrap(), TradeIntent::Buy(0.9));
        assert_eq!(decode(&[1.0, 0.5]).unwrap(), TradeIntent::Buy(0.5));
    }

    #[test]
    fn out_of_range_values_pass_through() {
        assert_eq!(decode(&[-4.0, 3.5]).unwrap(), TradeIntent::Sell(3.5));
        assert_eq!(decode(&[7.0, -1.0]).unwrap(), TradeIntent::Buy(-1.0));
        assert_eq!(decode(&[f64::NAN, 1.0]).unwrap(), TradeIntent::Hold);
        assert_eq!(decode(&[f64::INFINITY, 0.9]).unwrap(), TradeIntent::Buy(0.9));
        assert_eq!(decode(&[f64::NEG_INFINITY, 0.6]).unwrap(), TradeIntent::Sell(0.6));
    }

    #[test]
    fn wrong_width_is_rejected() {
        assert_eq!(
            decode(&[0.5]),
            Err(SimError::InvalidActionShape {
                expected: 2,
                got: 1
            })
        );
        assert!(decode(&[0.1, 0.2, 0.3]).is_err());
        assert!(decode(&[]).is_err());
    }
}
