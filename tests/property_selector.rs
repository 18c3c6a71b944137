use std::collections::HashSet;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use capquiz_backend::quiz::config::{QuizSettings, SelectionStrategy};
use capquiz_backend::quiz::elo::ideal_opponent_rating;
use capquiz_backend::quiz::selector::select_slot;
use capquiz_backend::store::Store;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pt_selection_stays_within_nearest_k(
        ratings in proptest::collection::vec(500.0_f64..2000.0, 1..25),
        k in 1_usize..6,
        p in 0.2_f64..0.8,
        seed in any::<u64>(),
    ) {
        let store = Store::temporary().unwrap();
        let settings = QuizSettings {
            default_user_rating: 1200.0,
            selection: SelectionStrategy::NearestRandom {
                user_win_probability: p,
                number_of_candidates: k,
                min_questions_until_reappearance: 0,
            },
            ..QuizSettings::default()
        };
        let quiz = store.create_quiz("prop", settings).unwrap();
        for (i, rating) in ratings.iter().enumerate() {
            store.create_slot(quiz.id, &format!("q{i}"), *rating).unwrap();
        }
        let user = store.get_or_create_quiz_user(quiz.id, "prop", 1200.0).unwrap();

        let target = ideal_opponent_rating(p, user.rating).unwrap();
        let mut slots = store.list_quiz_slots(quiz.id).unwrap();
        slots.sort_by(|a, b| {
            (a.rating - target)
                .abs()
                .total_cmp(&(b.rating - target).abs())
                .then(a.id.cmp(&b.id))
        });
        let nearest: HashSet<u64> = slots.iter().take(k).map(|s| s.id).collect();

        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..20 {
            let picked = select_slot(&store, &quiz, &user, &mut rng).unwrap().unwrap();
            prop_assert!(nearest.contains(&picked.id));
        }
    }
}
