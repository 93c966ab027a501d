use crate::MissionProgress;

/// The shipped missions, in unlock order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionId {
    EmailUrgency,
    InsiderThreat,
    BecSecurity,
    DataSecurity,
}

impl MissionId {
    /// Linear unlock chain: each mission needs the one before it completed
    pub const CHAIN: [MissionId; 4] = [
        MissionId::EmailUrgency,
        MissionId::InsiderThreat,
        MissionId::BecSecurity,
        MissionId::DataSecurity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MissionId::EmailUrgency => "email-urgency",
            MissionId::InsiderThreat => "insider-threat",
            MissionId::BecSecurity => "bec-security",
            MissionId::DataSecurity => "data-security",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::CHAIN
            .iter()
            .copied()
            .find(|mission| mission.as_str() == raw.trim())
    }

    pub fn predecessor(self) -> Option<Self> {
        let position = Self::CHAIN.iter().position(|m| *m == self)?;
        position.checked_sub(1).map(|prev| Self::CHAIN[prev])
    }

    /// A mission is playable once its predecessor has been completed
    pub fn is_unlocked(self, missions: &[MissionProgress]) -> bool {
        match self.predecessor() {
            None => true,
            Some(prev) => find_progress(missions, prev.as_str()).map_or(false, |p| p.completed),
        }
    }
}

pub fn find_progress<'a>(missions: &'a [MissionProgress], mission_id: &str) -> Option<&'a MissionProgress> {
    missions.iter().find(|m| m.mission_id == mission_id)
}

pub fn find_progress_mut<'a>(
    missions: &'a mut [MissionProgress],
    mission_id: &str,
) -> Option<&'a mut MissionProgress> {
    missions.iter_mut().find(|m| m.mission_id == mission_id)
}
