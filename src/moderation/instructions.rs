//! The instruction contract sent to the model.
//!
//! Violence policy: any depiction of violence sets `isViolence`, regardless of
//! audience age. Both adapters share this template.

/// A named verdict field and the instruction describing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerdictField {
    pub key: &'static str,
    pub instruction: &'static str,
}

/// Versioned instruction block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionTemplate {
    pub version: &'static str,
    pub preamble: &'static str,
    pub fields: &'static [VerdictField],
}

pub const VERDICT_FIELDS: [VerdictField; 7] = [
    VerdictField {
        key: "details",
        instruction: "A description of the image.",
    },
    VerdictField {
        key: "category",
        instruction: "A common one word category that would label the image.",
    },
    VerdictField {
        key: "isViolence",
        instruction: "True if the image contains violence. Else False.",
    },
    VerdictField {
        key: "isPornographic",
        instruction: "True if the image contains pornographic material. Else False.",
    },
    VerdictField {
        key: "isProfanity",
        instruction: "True if the image contains any use of profanity language. Else False.",
    },
    VerdictField {
        key: "isLikelyAI_Score",
        instruction: "A probability score that the image is likely AI generated (0 to 1).",
    },
    VerdictField {
        key: "isLikelyAI_Explanation",
        instruction: "Explanation for the probability score given.",
    },
];

pub const MODERATION_INSTRUCTIONS: InstructionTemplate = InstructionTemplate {
    version: "1",
    preamble: "Return a JSON object with the following fields:",
    fields: &VERDICT_FIELDS,
};

impl InstructionTemplate {
    /// Render the numbered instruction block.
    pub fn render(&self) -> String {
        let mut out = String::from(self.preamble);
        for (i, field) in self.fields.iter().enumerate() {
            out.push('\n');
            out.push_str(&format!("{}. {} = {}", i + 1, field.key, field.instruction));
        }
        out
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.key)
    }
}

impl Default for InstructionTemplate {
    fn default() -> Self {
        MODERATION_INSTRUCTIONS
    }
}
