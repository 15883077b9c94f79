//! Deduplication of query results by ticket id.

use std::collections::HashMap;

use super::QueryResult;
use crate::ticket::CategorizedTicket;

/// Merge the results of the per-category queries into unique tickets.
///
/// Tickets keep first-seen order. A ticket returned by several queries appears
/// once, tagged with every category that returned it; the first payload seen wins.
pub fn deduplicate(results: Vec<QueryResult>) -> Vec<CategorizedTicket> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CategorizedTicket> = Vec::new();

    for result in results {
        for ticket in result.tickets {
            match index.get(&ticket.id) {
                Some(&position) => {
                    unique[position].categories.insert(result.category);
                }
                None => {
                    index.insert(ticket.id.clone(), unique.len());
                    unique.push(CategorizedTicket::new(ticket, result.category));
                }
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;
    use crate::ticket::TicketCategory;

    fn ids(tickets: &[CategorizedTicket]) -> Vec<&str> {
        tickets.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn test_disjoint_results_keep_order() {
        let results = vec![
            QueryResult::new(
                TicketCategory::New,
                vec![fixtures::ticket("3", "a"), fixtures::ticket("1", "b")],
            ),
            QueryResult::new(TicketCategory::Overdue, vec![]),
            QueryResult::new(TicketCategory::Expiring, vec![fixtures::ticket("2", "c")]),
        ];

        let unique = deduplicate(results);
        assert_eq!(ids(&unique), vec!["3", "1", "2"]);
        assert!(unique[0].has(TicketCategory::New));
        assert!(unique[2].has(TicketCategory::Expiring));
        assert_eq!(unique[2].categories.len(), 1);
    }

    #[test]
    fn test_shared_ticket_gets_union_of_categories() {
        let results = vec![
            QueryResult::new(TicketCategory::New, vec![fixtures::ticket("7", "first")]),
            QueryResult::new(
                TicketCategory::Overdue,
                vec![fixtures::ticket("8", "x"), fixtures::ticket("7", "second")],
            ),
            QueryResult::new(TicketCategory::Expiring, vec![fixtures::ticket("8", "y")]),
        ];

        let unique = deduplicate(results);
        assert_eq!(ids(&unique), vec!["7", "8"]);
        assert_eq!(
            unique[0].categories.iter().copied().collect::<Vec<_>>(),
            vec![TicketCategory::New, TicketCategory::Overdue]
        );
        assert_eq!(
            unique[1].categories.iter().copied().collect::<Vec<_>>(),
            vec![TicketCategory::Overdue, TicketCategory::Expiring]
        );
        // First-seen payload is kept.
        assert_eq!(unique[0].ticket.subject, "first");
    }

    #[test]
    fn test_duplicates_within_one_query_collapse() {
        let results = vec![QueryResult::new(
            TicketCategory::New,
            vec![fixtures::ticket("1", "a"), fixtures::ticket("1", "a")],
        )];
        let unique = deduplicate(results);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].categories.len(), 1);
    }

    #[test]
    fn test_every_id_appears_once() {
        let tickets = |range: std::ops::Range<u32>| {
            range
                .map(|i| fixtures::ticket(&i.to_string(), "t"))
                .collect::<Vec<_>>()
        };
        let results = vec![
            QueryResult::new(TicketCategory::New, tickets(0..30)),
            QueryResult::new(TicketCategory::Overdue, tickets(20..45)),
            QueryResult::new(TicketCategory::Expiring, tickets(10..25)),
        ];

        let unique = deduplicate(results);
        assert_eq!(unique.len(), 45);

        let mut seen = std::collections::HashSet::new();
        assert!(unique.iter().all(|t| seen.insert(t.id().to_string())));

        let t22 = unique.iter().find(|t| t.id() == "22").unwrap();
        assert_eq!(t22.categories.len(), 3);
        let t40 = unique.iter().find(|t| t.id() == "40").unwrap();
        assert_eq!(
            t40.categories.iter().copied().collect::<Vec<_>>(),
            vec![TicketCategory::Overdue]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(Vec::new()).is_empty());
    }
}
