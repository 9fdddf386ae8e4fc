use tandem_accounts::{MatchSetting, UserProfile};

/// Mutual compatibility: both age filters admit the other's age (inclusive
/// at both ends) and both gender filters admit the other's gender. No
/// scoring beyond that; the first queue candidate that passes wins.
pub fn compatible(
    my_setting: &MatchSetting,
    me: &UserProfile,
    their_setting: &MatchSetting,
    them: &UserProfile,
) -> bool {
    my_setting.age_min <= them.age
        && them.age <= my_setting.age_max
        && their_setting.age_min <= me.age
        && me.age <= their_setting.age_max
        && my_setting.preferred_gender.admits(them.gender)
        && their_setting.preferred_gender.admits(me.gender)
}
