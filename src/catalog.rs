// Fixed mission content: every step and its answer key.

use crate::missions::MissionId;
use crate::scoring::{
    Activity, Aggregation, DataCase, DecisionCase, DialogueStep, EmailCase, InsiderCase,
    OrderPuzzle, PolicyTable, StepSpec,
};

/// Points available per insider-threat case (two activities at 10 each)
pub const INSIDER_POINTS_PER_CASE: i32 = 20;

/// Points available per data-classification scenario (three choices at 10 each)
pub const DATA_POINTS_PER_CASE: i32 = DataCase::MAX_POINTS;

#[derive(Debug)]
pub struct MissionDef {
    pub title: &'static str,
    pub steps: &'static [StepSpec],
    pub aggregation: Aggregation,
}

impl MissionDef {
    pub fn step(&self, index: u32) -> Option<&'static StepSpec> {
        self.steps.get(index as usize)
    }
}

pub fn mission(id: MissionId) -> &'static MissionDef {
    match id {
        MissionId::EmailUrgency => &EMAIL_URGENCY,
        MissionId::InsiderThreat => &INSIDER_THREAT,
        MissionId::BecSecurity => &BEC_SECURITY,
        MissionId::DataSecurity => &DATA_SECURITY,
    }
}

// ==================== EMAIL URGENCY ====================

static EMAIL_URGENCY: MissionDef = MissionDef {
    title: "Urgent Inbox",
    aggregation: Aggregation::MeanScore,
    steps: &[
        StepSpec::RedFlags(EmailCase {
            subject: "URGENT: Your account will be suspended in 24 hours",
            red_flags: &[
                "lookalike-domain",
                "urgent-deadline",
                "credential-link",
                "generic-greeting",
            ],
            decoys: &["company-logo", "footer-address", "unsubscribe-link"],
        }),
        StepSpec::RedFlags(EmailCase {
            subject: "Invoice #48213 overdue - action required",
            red_flags: &["unexpected-attachment", "payment-details-change", "pressure-tone"],
            decoys: &["invoice-number", "signature-block"],
        }),
        StepSpec::RedFlags(EmailCase {
            subject: "IT: Mandatory password reset within 2 hours",
            red_flags: &["external-sender", "time-pressure", "mismatched-url"],
            decoys: &["ticket-reference", "helpdesk-phone", "company-logo"],
        }),
    ],
};

// ==================== INSIDER THREAT ====================

static INSIDER_THREAT: MissionDef = MissionDef {
    title: "Inside Job",
    aggregation: Aggregation::NormalizedPoints {
        max_per_step: INSIDER_POINTS_PER_CASE,
    },
    steps: &[
        StepSpec::Activities(InsiderCase {
            employee: "Database administrator, night shift",
            activities: &[
                Activity {
                    id: "bulk-download",
                    description: "Downloaded 4 GB of customer records at 02:13",
                    suspicious: true,
                },
                Activity {
                    id: "vpn-login",
                    description: "VPN login from home city during business hours",
                    suspicious: false,
                },
            ],
        }),
        StepSpec::Activities(InsiderCase {
            employee: "Product designer, notice period",
            activities: &[
                Activity {
                    id: "usb-copy",
                    description: "Copied unreleased design files to a personal USB drive",
                    suspicious: true,
                },
                Activity {
                    id: "shared-drive",
                    description: "Opened the team drive for an assigned project",
                    suspicious: false,
                },
            ],
        }),
        StepSpec::Activities(InsiderCase {
            employee: "Sales manager, recent role change",
            activities: &[
                Activity {
                    id: "calendar-forward",
                    description: "Forwarded a meeting invite to a colleague",
                    suspicious: false,
                },
                Activity {
                    id: "admin-request",
                    description: "Requested finance admin rights outside role scope",
                    suspicious: true,
                },
            ],
        }),
    ],
};

// ==================== BUSINESS EMAIL COMPROMISE ====================

static BEC_SECURITY: MissionDef = MissionDef {
    title: "Wire Fraud Desk",
    aggregation: Aggregation::VerificationBlend,
    steps: &[
        StepSpec::SenderOrder(OrderPuzzle {
            canonical: &[
                "check-sender-address",
                "inspect-reply-to",
                "compare-known-contact",
                "call-known-number",
                "confirm-with-finance",
            ],
        }),
        StepSpec::Policies(PolicyTable {
            relevant: &[
                "dual-approval",
                "callback-verification",
                "vendor-change-freeze",
                "out-of-band-confirmation",
            ],
            distractors: &["reply-to-email", "urgent-exception", "share-credentials"],
        }),
        StepSpec::Dialogue(DialogueStep {
            prompt: "The CFO just emailed asking for a $48,000 wire today. What do you tell your supervisor?",
            correct_options: &["report-request", "mention-urgency"],
            other_options: &["already-paid", "ignore-it"],
        }),
        StepSpec::Dialogue(DialogueStep {
            prompt: "Your supervisor asks how you checked who really sent it.",
            correct_options: &["called-known-number", "checked-headers"],
            other_options: &["replied-to-email", "trusted-signature"],
        }),
        StepSpec::Dialogue(DialogueStep {
            prompt: "Your supervisor asks what should happen next.",
            correct_options: &["hold-payment", "notify-security", "document-incident"],
            other_options: &["process-anyway"],
        }),
        StepSpec::Decision(DecisionCase { fraudulent: true }),
    ],
};

// ==================== DATA SECURITY ====================

static DATA_SECURITY: MissionDef = MissionDef {
    title: "Need to Know",
    aggregation: Aggregation::NormalizedPoints {
        max_per_step: DATA_POINTS_PER_CASE,
    },
    steps: &[
        StepSpec::Classification(DataCase {
            asset: "Quarterly payroll export with salaries and bank details",
            classification: "restricted",
            access: "named-individuals",
            security: "encrypt-at-rest",
        }),
        StepSpec::Classification(DataCase {
            asset: "Draft roadmap for next year's product launches",
            classification: "confidential",
            access: "team-only",
            security: "encrypt-in-transit",
        }),
        StepSpec::Classification(DataCase {
            asset: "Office holiday schedule",
            classification: "internal",
            access: "all-staff",
            security: "standard-share",
        }),
        StepSpec::Classification(DataCase {
            asset: "Published press release",
            classification: "public",
            access: "everyone",
            security: "no-restriction",
        }),
    ],
};
