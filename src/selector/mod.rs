use crate::ticket::Ticket;

/// Cheapest ticket of the batch; the first one seen wins a tie.
///
/// Knows nothing about the dedup store or the price threshold: callers
/// filter before and apply the cutoff after.
pub fn select_cheapest(tickets: &[Ticket]) -> Option<&Ticket> {
    let mut cheapest: Option<&Ticket> = None;
    for ticket in tickets {
        match cheapest {
            Some(best) if ticket.price >= best.price => {}
            _ => cheapest = Some(ticket),
        }
    }
    cheapest
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn ticket(id: &str, price: &str) -> Ticket {
        Ticket::new(id, Decimal::from_str(price).unwrap(), "1", "1")
    }

    #[test]
    fn test_empty_batch() {
        assert!(select_cheapest(&[]).is_none());
    }

    #[test]
    fn test_picks_minimum() {
        let batch = vec![ticket("x", "120"), ticket("y", "95"), ticket("z", "99.99")];
        assert_eq!(select_cheapest(&batch).unwrap().identifier, "y");
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let batch = vec![
            ticket("a", "101"),
            ticket("b", "80.00"),
            ticket("c", "80"),
            ticket("d", "80.0"),
        ];
        assert_eq!(select_cheapest(&batch).unwrap().identifier, "b");
    }

    #[test]
    fn test_single_candidate() {
        let batch = vec![ticket("only", "130")];
        assert_eq!(select_cheapest(&batch).unwrap().identifier, "only");
    }
}
