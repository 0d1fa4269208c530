//! Allowed RFP status transitions

use crate::domain::RfpStatus;

/// Statuses reachable in one step from `from`.
pub const fn allowed_targets(from: RfpStatus) -> &'static [RfpStatus] {
    use RfpStatus::*;
    match from {
        Draft => &[Published],
        // RESPONSE_SUBMITTED is entered implicitly by the first supplier response
        Published => &[ResponseSubmitted, UnderReview],
        ResponseSubmitted => &[UnderReview],
        UnderReview => &[Approved, Rejected],
        Approved | Rejected => &[],
    }
}

pub fn is_allowed(from: RfpStatus, to: RfpStatus) -> bool {
    allowed_targets(from).contains(&to)
}

pub fn is_terminal(status: RfpStatus) -> bool {
    allowed_targets(status).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use RfpStatus::*;

    const EDGES: [(RfpStatus, RfpStatus); 6] = [
        (Draft, Published),
        (Published, ResponseSubmitted),
        (Published, UnderReview),
        (ResponseSubmitted, UnderReview),
        (UnderReview, Approved),
        (UnderReview, Rejected),
    ];

    #[test]
    fn table_matches_edge_list() {
        for from in RfpStatus::ALL {
            for to in RfpStatus::ALL {
                assert_eq!(
                    is_allowed(from, to),
                    EDGES.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn only_approved_and_rejected_are_terminal() {
        let terminal: Vec<_> = RfpStatus::ALL.into_iter().filter(|s| is_terminal(*s)).collect();
        assert_eq!(terminal, vec![Approved, Rejected]);
    }

    #[test]
    fn no_self_loops() {
        for status in RfpStatus::ALL {
            assert!(!is_allowed(status, status));
        }
    }
}
