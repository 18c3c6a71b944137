use serde::Serialize;

use crate::quiz::config::QuizSettings;
use crate::store::operations::quiz_users::QuizUser;

/// Star counters before and after a rating change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StarProgress {
    pub achieved_before: u32,
    pub achieved_after: u32,
    pub graded_before: u32,
    pub graded_after: u32,
}

impl StarProgress {
    pub fn achieved_raised(&self) -> bool {
        self.achieved_after > self.achieved_before
    }

    pub fn graded_raised(&self) -> bool {
        self.graded_after > self.graded_before
    }
}

/// Raises the user's star counters to the level their rating now meets.
///
/// Both counters only ever go up. The graded counter stays frozen once the
/// quiz is past due.
pub fn apply_star_ratchet(
    user: &mut QuizUser,
    settings: &QuizSettings,
    past_due: bool,
) -> StarProgress {
    let before = StarProgress {
        achieved_before: user.highest_stars_achieved,
        achieved_after: user.highest_stars_achieved,
        graded_before: user.highest_stars_graded,
        graded_after: user.highest_stars_graded,
    };

    let level = settings.star_level_for(user.rating);
    if level == 0 {
        return before;
    }

    if user.highest_stars_achieved < level {
        user.highest_stars_achieved = level;
    }
    if !past_due && user.highest_stars_graded < level {
        user.highest_stars_graded = level;
    }

    StarProgress {
        achieved_after: user.highest_stars_achieved,
        graded_after: user.highest_stars_graded,
        ..before
    }
}
