use crate::domain::applications::application::ApplicationSummary;

/// Authenticated caller, with the relations access rules depend on.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: i64,
    pub is_admin: bool,
    pub is_teacher: bool,
    /// Activity refs this user teaches.
    pub activity_ref_ids: Vec<i64>,
    /// Users attached to this account or linked to it as family members.
    pub family_user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    None,
    Read,
    Edit,
    Manage,
}

impl Actor {
    fn is_self_or_family(&self, user_id: i64) -> bool {
        user_id == self.user_id || self.family_user_ids.contains(&user_id)
    }

    pub fn capability_on(&self, app: &ApplicationSummary) -> Capability {
        if self.is_admin {
            return Capability::Manage;
        }
        if self.is_teacher && app.concerns_any_activity_ref(&self.activity_ref_ids) {
            return Capability::Edit;
        }
        if self.is_self_or_family(app.user_id) || app.user_attached_to_id == Some(self.user_id) {
            return Capability::Edit;
        }
        Capability::None
    }

    pub fn can_read(&self, app: &ApplicationSummary) -> bool {
        self.capability_on(app) >= Capability::Read
    }

    pub fn can_edit(&self, app: &ApplicationSummary) -> bool {
        self.capability_on(app) >= Capability::Edit
    }

    pub fn can_manage(&self, app: &ApplicationSummary) -> bool {
        self.capability_on(app) >= Capability::Manage
    }

    /// Only administrators delete applications.
    pub fn can_destroy(&self, app: &ApplicationSummary) -> bool {
        self.can_manage(app)
    }

    /// `user_id == 0` stands for a person the wizard is about to create.
    pub fn can_create_for(&self, user_id: i64) -> bool {
        self.is_admin || user_id == 0 || self.is_self_or_family(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(user_id: i64, refs: Vec<i64>) -> ApplicationSummary {
        ApplicationSummary {
            id: 1,
            user_id,
            user_attached_to_id: None,
            season_id: 1,
            status_id: Some(1),
            activity_ref_ids: refs,
        }
    }

    #[test]
    fn admin_manages_everything() {
        let admin = Actor {
            user_id: 1,
            is_admin: true,
            ..Default::default()
        };
        assert!(admin.can_destroy(&app(99, vec![])));
        assert!(admin.can_create_for(42));
    }

    #[test]
    fn teacher_edits_only_their_activities() {
        let teacher = Actor {
            user_id: 2,
            is_teacher: true,
            activity_ref_ids: vec![5],
            ..Default::default()
        };
        assert!(teacher.can_edit(&app(10, vec![5, 6])));
        assert!(!teacher.can_read(&app(10, vec![7])));
        assert!(!teacher.can_destroy(&app(10, vec![5])));
    }

    #[test]
    fn families_reach_their_own_applications() {
        let parent = Actor {
            user_id: 3,
            family_user_ids: vec![4],
            ..Default::default()
        };
        assert!(parent.can_read(&app(3, vec![])));
        assert!(parent.can_edit(&app(4, vec![])));
        assert!(!parent.can_read(&app(5, vec![])));
        assert!(parent.can_create_for(0));
        assert!(parent.can_create_for(4));
        assert!(!parent.can_create_for(5));

        let mut attached = app(8, vec![]);
        attached.user_attached_to_id = Some(3);
        assert!(parent.can_read(&attached));
    }
}
