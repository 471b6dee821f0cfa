//! Order/reply payload checks, enabled with `SOCKHUB_VALIDATE_ORDERS=1`.
//!
//! Payload layout, little-endian:
//!
//! ```text
//!   reply: [1][body...]
//!   order: [2][legs:u8] legs × [instrument:u16][quantity:i32]
//! ```

use sockhub_engine::{ClientId, FrameValidator, Rejection, Scope};

const REPLY: u8 = 1;
const ORDER: u8 = 2;
const LEG_LEN: usize = 6;

pub struct OrderValidator;

impl FrameValidator for OrderValidator {
    fn validate(&self, _: ClientId, payload: &[u8], scratch: &Scope<'_>) -> Result<(), Rejection> {
        match payload.first() {
            Some(&REPLY) => Ok(()),
            Some(&ORDER) => validate_order(&payload[1..], scratch),
            Some(_) => Err(Rejection::Disconnect("unknown message type")),
            None => Err(Rejection::Drop("empty message")),
        }
    }
}

fn validate_order(body: &[u8], scratch: &Scope<'_>) -> Result<(), Rejection> {
    let (&legs, rest) = body
        .split_first()
        .ok_or(Rejection::Drop("order without leg count"))?;
    let legs = legs as usize;
    if legs == 0 {
        return Err(Rejection::Drop("order without legs"));
    }
    if rest.len() != legs * LEG_LEN {
        return Err(Rejection::Disconnect("order length mismatch"));
    }

    // Instruments of the legs checked so far, as raw u16 LE pairs.
    let seen = scratch
        .alloc(legs * 2)
        .map_err(|_| Rejection::Drop("no scratch for order"))?;
    for (i, leg) in rest.chunks_exact(LEG_LEN).enumerate() {
        let instrument = [leg[0], leg[1]];
        let quantity = i32::from_le_bytes([leg[2], leg[3], leg[4], leg[5]]);
        if quantity == 0 {
            return Err(Rejection::Drop("zero quantity"));
        }
        if seen[..i * 2].chunks_exact(2).any(|prev| prev == instrument) {
            return Err(Rejection::Drop("duplicate instrument"));
        }
        seen[i * 2..i * 2 + 2].copy_from_slice(&instrument);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockhub_core::Arena;

    fn order(legs: &[(u16, i32)]) -> Vec<u8> {
        let mut out = vec![ORDER, legs.len() as u8];
        for &(instrument, quantity) in legs {
            out.extend_from_slice(&instrument.to_le_bytes());
            out.extend_from_slice(&quantity.to_le_bytes());
        }
        out
    }

    fn check(payload: &[u8]) -> Result<(), Rejection> {
        let mut arena = Arena::new(1024);
        let scope = arena.checkpoint();
        OrderValidator.validate(ClientId::new(1), payload, &scope)
    }

    #[test]
    fn test_valid_messages() {
        assert_eq!(check(&[REPLY, b'o', b'k']), Ok(()));
        assert_eq!(check(&order(&[(7, 100), (8, -50)])), Ok(()));
    }

    #[test]
    fn test_malformed_orders() {
        assert_eq!(check(&[]), Err(Rejection::Drop("empty message")));
        assert_eq!(check(&[9]), Err(Rejection::Disconnect("unknown message type")));
        assert_eq!(check(&[ORDER]), Err(Rejection::Drop("order without leg count")));
        assert_eq!(check(&order(&[])), Err(Rejection::Drop("order without legs")));

        let mut short = order(&[(1, 1)]);
        short.pop();
        assert_eq!(check(&short), Err(Rejection::Disconnect("order length mismatch")));
    }

    #[test]
    fn test_order_leg_rules() {
        assert_eq!(check(&order(&[(1, 0)])), Err(Rejection::Drop("zero quantity")));
        assert_eq!(
            check(&order(&[(3, 1), (4, 2), (3, 5)])),
            Err(Rejection::Drop("duplicate instrument"))
        );
    }

    #[test]
    fn test_scratch_exhaustion_drops() {
        let mut arena = Arena::new(2);
        let scope = arena.checkpoint();
        assert_eq!(
            OrderValidator.validate(ClientId::new(1), &order(&[(1, 1), (2, 2)]), &scope),
            Err(Rejection::Drop("no scratch for order"))
        );
    }
}
