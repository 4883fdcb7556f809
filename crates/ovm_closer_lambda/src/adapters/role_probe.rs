use crate::runtime::classify::RoleAssumptionOutcome;

pub trait AdminRoleProbe {
    fn assume_admin_role(&self, role_arn: &str, session_name: &str) -> RoleAssumptionOutcome;
}
