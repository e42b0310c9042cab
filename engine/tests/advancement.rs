use bracket_engine::cache::StandingsCache;
use bracket_engine::config::{Configurator, TournamentConfig};
use bracket_engine::orchestrator::{CompletionOrchestrator, EngineSettings, spawn_listener};
use bracket_engine::store::{GameQuery, MemoryStore, Store};
use bracket_engine::{
    Advance, BracketPlacement, BracketRound, EngineError, Game, GameStatus, Outcome, Slot,
};
use std::sync::Arc;
use tokio::time::{Duration, sleep};

fn game(id: &str, number: u32, round: BracketRound, a: Slot, b: Slot) -> Game {
    Game {
        id: id.into(),
        tournament_id: "cup".into(),
        division_id: "open".into(),
        slot_a: a,
        slot_b: b,
        score_a: 0,
        score_b: 0,
        status: GameStatus::Scheduled,
        start_time: None,
        bracket: Some(BracketPlacement {
            bracket_id: "elite".into(),
            round,
            round_number: 1,
            position: number - 1,
            game_number: number,
        }),
        pool: None,
        advances: vec![],
    }
}

const CONSOLATION: [&str; 3] = ["c1", "c2", "c3"];

/// G1 and G2 both feed G5 as winners and every consolation game as losers.
async fn elite_eight(store: &Arc<MemoryStore>) -> Configurator<MemoryStore> {
    let r1 = BracketRound::Round(1);
    store.put_game(game("g1", 1, r1, Slot::team("A"), Slot::team("B"))).await.unwrap();
    store.put_game(game("g2", 2, r1, Slot::team("C"), Slot::team("D"))).await.unwrap();
    store
        .put_game(game(
            "g5",
            5,
            BracketRound::Semifinals,
            Slot::pending("Winner of Game 1"),
            Slot::pending("Winner of Game 2"),
        ))
        .await
        .unwrap();
    for (i, id) in CONSOLATION.iter().enumerate() {
        store
            .put_game(game(
                id,
                6 + i as u32,
                BracketRound::Round(2),
                Slot::pending("Loser of Game 1"),
                Slot::pending("Loser of Game 2"),
            ))
            .await
            .unwrap();
    }

    let configurator = Configurator::new(Arc::clone(store));
    let mut edges = vec![Advance::winner("g5")];
    edges.extend(CONSOLATION.iter().map(|c| Advance::loser(*c)));
    configurator.set_advancement("g1", &edges).await.unwrap();
    configurator.set_advancement("g2", &edges).await.unwrap();
    configurator
}

fn orchestrator(store: &Arc<MemoryStore>) -> Arc<CompletionOrchestrator<MemoryStore, StandingsCache>> {
    Arc::new(CompletionOrchestrator::new(
        Arc::clone(store),
        Arc::new(StandingsCache::new()),
        EngineSettings::default(),
    ))
}

#[tokio::test(start_paused = true)]
async fn elite_eight_winner_and_losers_fan_out() {
    let store = Arc::new(MemoryStore::new());
    let configurator = elite_eight(&store).await;
    let orchestrator = orchestrator(&store);
    let listener = spawn_listener(Arc::clone(&orchestrator), store.subscribe());
    let g2_before = store.game("g2").await.unwrap().unwrap();

    configurator.update_game("g1", GameStatus::Completed, Some((50, 40))).await.unwrap();
    sleep(Duration::from_millis(50)).await;

    let g5 = store.game("g5").await.unwrap().unwrap();
    assert_eq!(g5.team_a(), Some("A"));
    assert!(g5.slot_b.is_pending());

    let mut holding_b = 0;
    for id in CONSOLATION {
        let c = store.game(id).await.unwrap().unwrap();
        if c.team_a() == Some("B") {
            holding_b += 1;
        }
        assert_eq!(c.slot_b, Slot::pending("Loser of Game 2"));
    }
    assert_eq!(holding_b, 3);
    assert_eq!(store.game("g2").await.unwrap().unwrap(), g2_before);
    assert_eq!(orchestrator.stats().advanced, 1);
    listener.abort();
}

#[tokio::test(start_paused = true)]
async fn repeated_notifications_do_not_move_slots() {
    let store = Arc::new(MemoryStore::new());
    let configurator = elite_eight(&store).await;
    let orchestrator = orchestrator(&store);

    let done = configurator.update_game("g1", GameStatus::Completed, Some((50, 40))).await.unwrap();
    orchestrator.on_game_changed(done.clone()).await;
    let after_first = store.snapshot().await.games;

    for _ in 0..3 {
        orchestrator.on_game_changed(done.clone()).await;
    }
    assert_eq!(store.snapshot().await.games, after_first);
    assert_eq!(orchestrator.stats().advanced, 1);
    assert_eq!(orchestrator.stats().skipped_duplicates, 3);
}

#[tokio::test]
async fn third_feed_into_a_game_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let configurator = elite_eight(&store).await;
    let g5_before = store.game("g5").await.unwrap().unwrap();

    let err = configurator.link_games("c1", Outcome::Winner, "g5").await;
    assert_eq!(err, Err(EngineError::CapacityExceeded { target: "g5".into() }));
    assert_eq!(store.game("g5").await.unwrap().unwrap(), g5_before);
    assert!(store.game("c1").await.unwrap().unwrap().advances.is_empty());
}

#[tokio::test(start_paused = true)]
async fn both_results_fill_the_semifinal() {
    let store = Arc::new(MemoryStore::new());
    let configurator = elite_eight(&store).await;
    let orchestrator = orchestrator(&store);

    for (id, a, b) in [("g2", 61, 70), ("g1", 50, 40)] {
        let done = configurator.update_game(id, GameStatus::Completed, Some((a, b))).await.unwrap();
        orchestrator.on_game_changed(done).await;
    }

    let g5 = store.game("g5").await.unwrap().unwrap();
    assert_eq!((g5.team_a(), g5.team_b()), (Some("A"), Some("D")));
    for id in CONSOLATION {
        let c = store.game(id).await.unwrap().unwrap();
        assert_eq!((c.team_a(), c.team_b()), (Some("B"), Some("C")));
    }
}

const TWO_DIVISIONS: &str = r#"{
    "id": "cup",
    "name": "Cup",
    "divisions": [
        { "id": "men", "name": "Men", "format": "bracket_only",
          "brackets": [{ "id": "b1", "name": "Men", "size": 4 }] },
        { "id": "women", "name": "Women", "format": "bracket_only",
          "brackets": [{ "id": "b2", "name": "Women", "size": 4 }] }
    ]
}"#;

async fn two_divisions() -> (Arc<MemoryStore>, Configurator<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let configurator = Configurator::new(Arc::clone(&store));
    configurator
        .apply(&TournamentConfig::from_json(TWO_DIVISIONS).unwrap())
        .await
        .unwrap();
    (store, configurator)
}

#[tokio::test]
async fn full_game_in_another_division_refuses_a_third_feed() {
    let (store, configurator) = two_divisions().await;
    let final_before = store.game("b2-g3").await.unwrap().unwrap();

    let err = configurator.link_games("b1-g1", Outcome::Loser, "b2-g3").await;
    assert_eq!(err, Err(EngineError::CapacityExceeded { target: "b2-g3".into() }));
    let err = configurator
        .set_advancement("b1-g1", &[Advance::winner("b1-g3"), Advance::loser("b2-g3")])
        .await;
    assert_eq!(err, Err(EngineError::CapacityExceeded { target: "b2-g3".into() }));

    assert_eq!(store.game("b2-g3").await.unwrap().unwrap(), final_before);
    assert_eq!(store.game("b1-g1").await.unwrap().unwrap().advances, vec![Advance::winner("b1-g3")]);
    let feeds = store.query_games(GameQuery::FeedsInto("b2-g3".into())).await.unwrap();
    assert_eq!(feeds.len(), 2);
}

#[tokio::test]
async fn cycles_through_another_division_are_refused() {
    let (store, configurator) = two_divisions().await;
    // Men's champion plays into the women's opener.
    assert!(configurator.link_games("b1-g3", Outcome::Winner, "b2-g1").await.unwrap());

    let err = configurator.link_games("b2-g3", Outcome::Loser, "b1-g1").await;
    assert!(matches!(err, Err(EngineError::CycleDetected { .. })));
    assert_eq!(store.game("b2-g3").await.unwrap().unwrap().advances, vec![]);
}
