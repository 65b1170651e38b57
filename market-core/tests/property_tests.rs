//! Property-based tests for market invariants
//!
//! These tests drive the engine with arbitrary operation sequences (invalid
//! calls included; rejections are part of the input space) and verify the
//! critical invariants after every run:
//! - Credit conservation: granted == Σ balances + Σ pools
//! - Single ownership: every ticket has exactly one owner
//! - At most one active order per ticket
//! - Deterministic replay: same events → same state

use chrono::{Duration, Utc};
use market_core::{
    clock::{Clock, ManualClock},
    AccountId, Amount, EngineParams, MarketEngine, MarketEvent, OptionIndex, OrderId,
    ProjectId, TicketId,
};
use proptest::prelude::*;

const ACCOUNTS: usize = 5;
const TICKET_PRICE: Amount = 1;

fn account(index: usize) -> AccountId {
    AccountId::new(format!("account-{}", index % ACCOUNTS))
}

fn all_holders() -> Vec<AccountId> {
    let mut holders: Vec<AccountId> = (0..ACCOUNTS).map(account).collect();
    holders.push(AccountId::order_book_escrow());
    holders
}

/// One step of an arbitrary run. Id fields are raw guesses; most resolve to
/// real entities, some intentionally miss.
#[derive(Debug, Clone)]
enum Action {
    Grant(usize),
    TransferCredits(usize, usize, Amount),
    ApproveCredits(usize, usize, Amount),
    TransferCreditsFrom(usize, usize, usize, Amount),
    CreateProject { creator: usize, deadline_minutes: u32, escrow: Amount },
    BuyTicket { buyer: usize, project: u64, option: OptionIndex },
    ApproveTicket { caller: usize, ticket: u64, operator: usize },
    SetApprovalForAll { caller: usize, operator: usize, enabled: bool },
    TransferTicket { caller: usize, ticket: u64, to: usize },
    SettleProject { caller: usize, project: u64, option: OptionIndex },
    ClaimWinnings { caller: usize, project: u64, ticket: u64 },
    ReclaimPool { caller: usize, project: u64 },
    ListTicket { seller: usize, ticket: u64, price: Amount },
    CancelOrder { caller: usize, order: u64 },
    BuyFromOrderBook { buyer: usize, order: u64 },
    BuyAtBestPrice { buyer: usize, project: u64, option: OptionIndex },
    AdvanceClock { minutes: u32 },
}

fn credit_action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..ACCOUNTS).prop_map(Action::Grant),
        (0..ACCOUNTS, 0..ACCOUNTS, 1u64..50).prop_map(|(a, b, amt)| {
            Action::TransferCredits(a, b, amt)
        }),
        (0..ACCOUNTS, 0..ACCOUNTS, 0u64..50).prop_map(|(a, b, amt)| {
            Action::ApproveCredits(a, b, amt)
        }),
        (0..ACCOUNTS, 0..ACCOUNTS, 0..ACCOUNTS, 1u64..50).prop_map(|(s, f, t, amt)| {
            Action::TransferCreditsFrom(s, f, t, amt)
        }),
    ]
}

fn ticket_action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..ACCOUNTS, 1u64..12, 0..ACCOUNTS).prop_map(|(caller, ticket, operator)| {
            Action::ApproveTicket {
                caller,
                ticket,
                operator,
            }
        }),
        (0..ACCOUNTS, 0..ACCOUNTS, any::<bool>()).prop_map(|(caller, operator, enabled)| {
            Action::SetApprovalForAll {
                caller,
                operator,
                enabled,
            }
        }),
        (0..ACCOUNTS, 1u64..12, 0..ACCOUNTS).prop_map(|(caller, ticket, to)| {
            Action::TransferTicket { caller, ticket, to }
        }),
    ]
}

fn project_action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..ACCOUNTS, 30u32..240, 1u64..30).prop_map(|(creator, deadline_minutes, escrow)| {
            Action::CreateProject {
                creator,
                deadline_minutes,
                escrow,
            }
        }),
        (0..ACCOUNTS, 1u64..6, 0u32..3).prop_map(|(buyer, project, option)| {
            Action::BuyTicket {
                buyer,
                project,
                option,
            }
        }),
        (0..ACCOUNTS, 1u64..6, 0u32..3).prop_map(|(caller, project, option)| {
            Action::SettleProject {
                caller,
                project,
                option,
            }
        }),
        (0..ACCOUNTS, 1u64..6, 1u64..12).prop_map(|(caller, project, ticket)| {
            Action::ClaimWinnings {
                caller,
                project,
                ticket,
            }
        }),
        (0..ACCOUNTS, 1u64..6).prop_map(|(caller, project)| Action::ReclaimPool {
            caller,
            project
        }),
        (1u32..180).prop_map(|minutes| Action::AdvanceClock { minutes }),
    ]
}

fn order_action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..ACCOUNTS, 1u64..12, 1u64..10).prop_map(|(seller, ticket, price)| {
            Action::ListTicket {
                seller,
                ticket,
                price,
            }
        }),
        (0..ACCOUNTS, 1u64..10).prop_map(|(caller, order)| Action::CancelOrder {
            caller,
            order
        }),
        (0..ACCOUNTS, 1u64..10).prop_map(|(buyer, order)| Action::BuyFromOrderBook {
            buyer,
            order
        }),
        (0..ACCOUNTS, 1u64..6, 0u32..3).prop_map(|(buyer, project, option)| {
            Action::BuyAtBestPrice {
                buyer,
                project,
                option,
            }
        }),
    ]
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        credit_action_strategy(),
        ticket_action_strategy(),
        project_action_strategy(),
        order_action_strategy(),
    ]
}

fn test_engine() -> (MarketEngine, ManualClock) {
    let clock = ManualClock::new(Utc::now());
    let engine = MarketEngine::new(
        EngineParams {
            grant_amount: 1000,
            ticket_price: TICKET_PRICE,
        },
        Box::new(clock.clone()),
    );
    (engine, clock)
}

/// Apply one action, collecting the event when the operation commits.
/// Rejections are expected and ignored; they must not change state, which
/// the replay property will catch if violated.
fn apply_action(
    engine: &mut MarketEngine,
    clock: &ManualClock,
    action: &Action,
    log: &mut Vec<MarketEvent>,
) {
    let mut record = |result: Option<MarketEvent>| {
        if let Some(event) = result {
            log.push(event);
        }
    };

    match action {
        Action::Grant(a) => record(engine.grant(&account(*a)).ok().map(|r| r.1)),
        Action::TransferCredits(a, b, amount) => record(
            engine
                .transfer_credits(&account(*a), &account(*b), *amount)
                .ok()
                .map(|r| r.1),
        ),
        Action::ApproveCredits(a, b, amount) => record(
            engine
                .approve_credits(&account(*a), &account(*b), *amount)
                .ok()
                .map(|r| r.1),
        ),
        Action::TransferCreditsFrom(s, f, t, amount) => record(
            engine
                .transfer_credits_from(&account(*s), &account(*f), &account(*t), *amount)
                .ok()
                .map(|r| r.1),
        ),
        Action::CreateProject {
            creator,
            deadline_minutes,
            escrow,
        } => record(
            engine
                .create_project(
                    &account(*creator),
                    "project".to_string(),
                    vec!["A".to_string(), "B".to_string(), "C".to_string()],
                    clock.now() + Duration::minutes(*deadline_minutes as i64),
                    *escrow,
                )
                .ok()
                .map(|r| r.1),
        ),
        Action::BuyTicket {
            buyer,
            project,
            option,
        } => record(
            engine
                .buy_ticket(
                    &account(*buyer),
                    ProjectId::new(*project),
                    *option,
                    TICKET_PRICE,
                )
                .ok()
                .map(|r| r.1),
        ),
        Action::ApproveTicket {
            caller,
            ticket,
            operator,
        } => record(
            engine
                .approve_ticket(&account(*caller), TicketId::new(*ticket), &account(*operator))
                .ok()
                .map(|r| r.1),
        ),
        Action::SetApprovalForAll {
            caller,
            operator,
            enabled,
        } => record(
            engine
                .set_approval_for_all(&account(*caller), &account(*operator), *enabled)
                .ok()
                .map(|r| r.1),
        ),
        Action::TransferTicket { caller, ticket, to } => record(
            engine
                .transfer_ticket(&account(*caller), TicketId::new(*ticket), &account(*to))
                .ok()
                .map(|r| r.1),
        ),
        Action::SettleProject {
            caller,
            project,
            option,
        } => record(
            engine
                .settle_project(&account(*caller), ProjectId::new(*project), *option)
                .ok()
                .map(|r| r.1),
        ),
        Action::ClaimWinnings {
            caller,
            project,
            ticket,
        } => record(
            engine
                .claim_winnings(
                    &account(*caller),
                    ProjectId::new(*project),
                    TicketId::new(*ticket),
                )
                .ok()
                .map(|r| r.1),
        ),
        Action::ReclaimPool { caller, project } => record(
            engine
                .reclaim_pool(&account(*caller), ProjectId::new(*project))
                .ok()
                .map(|r| r.1),
        ),
        Action::ListTicket {
            seller,
            ticket,
            price,
        } => record(
            engine
                .list_ticket(&account(*seller), TicketId::new(*ticket), *price)
                .ok()
                .map(|r| r.1),
        ),
        Action::CancelOrder { caller, order } => record(
            engine
                .cancel_order(&account(*caller), OrderId::new(*order))
                .ok()
                .map(|r| r.1),
        ),
        Action::BuyFromOrderBook { buyer, order } => {
            // Pay the asking price when the order exists; a raw guess
            // otherwise, which must be rejected
            let payment = engine
                .get_order(OrderId::new(*order))
                .map(|o| o.price)
                .unwrap_or(1);
            record(
                engine
                    .buy_from_order_book(&account(*buyer), OrderId::new(*order), payment)
                    .ok()
                    .map(|r| r.1),
            );
        }
        Action::BuyAtBestPrice {
            buyer,
            project,
            option,
        } => {
            let (_, prices) = engine.get_order_book(ProjectId::new(*project), *option);
            let payment = prices.iter().min().copied().unwrap_or(1);
            record(
                engine
                    .buy_at_best_price(
                        &account(*buyer),
                        ProjectId::new(*project),
                        *option,
                        payment,
                    )
                    .ok()
                    .map(|r| r.1),
            );
        }
        Action::AdvanceClock { minutes } => {
            clock.advance(Duration::minutes(*minutes as i64));
        }
    }
}

/// Every ticket is owned by exactly one account, and the owner's portfolio
/// lists it exactly once.
fn assert_single_ownership(engine: &MarketEngine) {
    let holders = all_holders();
    let minted = engine.tickets().total_minted();
    for raw in 1..=minted {
        let id = TicketId::new(raw);
        let owner = engine.owner_of(id).expect("minted ticket must resolve");
        let mut holdings = 0;
        for holder in &holders {
            let count = engine
                .tickets_of(holder)
                .iter()
                .filter(|&&t| t == id)
                .count();
            if holder == &owner {
                assert_eq!(count, 1, "owner portfolio must list ticket {id} once");
            } else {
                assert_eq!(count, 0, "non-owner {holder} must not hold ticket {id}");
            }
            holdings += count;
        }
        assert_eq!(holdings, 1, "ticket {id} held exactly once");
    }
}

/// No ticket is referenced by more than one active order.
fn assert_at_most_one_active_order(engine: &MarketEngine) {
    use std::collections::HashMap;
    let mut active_per_ticket: HashMap<TicketId, u32> = HashMap::new();

    let mut raw = 1;
    while let Ok(order) = engine.get_order(OrderId::new(raw)) {
        if order.is_active() {
            *active_per_ticket.entry(order.ticket_id).or_default() += 1;
        }
        raw += 1;
    }
    for (ticket, count) in active_per_ticket {
        assert!(count <= 1, "ticket {ticket} has {count} active orders");
    }
}

/// Replaying the collected log into a fresh engine reproduces the state.
fn assert_deterministic_replay(engine: &MarketEngine, clock: &ManualClock, log: &[MarketEvent]) {
    let mut rebuilt = MarketEngine::new(engine.params(), Box::new(clock.clone()));
    for event in log {
        rebuilt
            .apply_event(event)
            .expect("committed events must replay");
    }
    assert_eq!(rebuilt.sequence(), engine.sequence());
    assert_eq!(rebuilt.credits(), engine.credits());
    assert_eq!(rebuilt.tickets(), engine.tickets());
    assert_eq!(rebuilt.projects(), engine.projects());
    assert_eq!(rebuilt.orders(), engine.orders());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: all four invariants survive arbitrary operation sequences
    #[test]
    fn prop_invariants_hold_under_arbitrary_operations(
        actions in prop::collection::vec(action_strategy(), 1..80)
    ) {
        let (mut engine, clock) = test_engine();
        let mut log = Vec::new();

        for action in &actions {
            apply_action(&mut engine, &clock, action, &mut log);
            engine.check_credit_conservation().expect("conservation after every commit");
        }

        assert_single_ownership(&engine);
        assert_at_most_one_active_order(&engine);
        assert_deterministic_replay(&engine, &clock, &log);
    }

    /// Property: the grant is idempotent per account — one success, then
    /// AlreadyClaimed, and the balance grows by exactly one grant
    #[test]
    fn prop_grant_claims_once(attempts in 2usize..6) {
        let (mut engine, _clock) = test_engine();
        let alice = AccountId::new("alice");

        let (granted, _) = engine.grant(&alice).unwrap();
        for _ in 1..attempts {
            let err = engine.grant(&alice).unwrap_err();
            assert!(matches!(err, market_core::Error::AlreadyClaimed));
        }
        prop_assert_eq!(engine.balance_of(&alice), granted);
        prop_assert_eq!(engine.credits().total_granted(), granted);
    }

    /// Property: the pool never exceeds escrow plus ticket payments, and
    /// settlement never disburses more than the pool held at settlement
    #[test]
    fn prop_escrow_conservation(escrow in 1u64..100, purchases in 0usize..20) {
        let (mut engine, clock) = test_engine();
        let creator = account(0);
        engine.grant(&creator).unwrap();

        let (project, _) = engine
            .create_project(
                &creator,
                "pool".to_string(),
                vec!["A".to_string(), "B".to_string()],
                clock.now() + Duration::hours(1),
                escrow,
            )
            .unwrap();

        let mut paid = 0u64;
        for i in 0..purchases {
            let buyer = account(1 + (i % (ACCOUNTS - 1)));
            let _ = engine.grant(&buyer);
            if engine.buy_ticket(&buyer, project, (i % 2) as u32, TICKET_PRICE).is_ok() {
                paid += TICKET_PRICE;
            }
        }

        let pool_at_settlement = engine.get_project(project).unwrap().pool_balance;
        prop_assert_eq!(pool_at_settlement, escrow + paid);

        clock.advance(Duration::hours(2));
        engine.settle_project(&creator, project, 0).unwrap();

        // Claim every winning ticket
        let mut disbursed = 0u64;
        for raw in 1..=engine.tickets().total_minted() {
            let ticket = engine.ticket_info(TicketId::new(raw)).unwrap();
            if ticket.project_id == project && ticket.option_index == 0 {
                let owner = ticket.owner.clone();
                let (amount, _) = engine.claim_winnings(&owner, project, ticket.id).unwrap();
                disbursed += amount;
            }
        }

        prop_assert!(disbursed <= pool_at_settlement);
        let remaining = engine.get_project(project).unwrap().pool_balance;
        prop_assert_eq!(remaining, pool_at_settlement - disbursed);
        engine.check_credit_conservation().unwrap();
    }
}
