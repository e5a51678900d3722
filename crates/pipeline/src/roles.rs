//! Agent roles and default task templates for each stage.
//!
//! The role is sent as the system message; the rendered task plus the
//! expected-output description is sent as the user message.

use careplan_core::Stage;

/// Who the model is asked to be for one stage.
#[derive(Debug, Clone, Copy)]
pub struct AgentRole {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

impl AgentRole {
    pub fn system_prompt(&self) -> String {
        format!(
            "You are the {}.\n\nYour goal: {}\n\nBackground: {}",
            self.role, self.goal, self.backstory
        )
    }
}

/// Everything the pipeline needs to prompt one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageProfile {
    pub agent: AgentRole,
    /// Default task template.
    pub template: &'static str,
    pub expected_output: &'static str,
    /// Placeholders this stage can bind.
    pub placeholders: &'static [&'static str],
}

pub fn profile(stage: Stage) -> &'static StageProfile {
    match stage {
        Stage::Analysis => &ANALYSIS,
        Stage::DietPlanning => &DIET,
        Stage::MedicalEvaluation => &MEDICAL,
        Stage::FitnessPlanning => &FITNESS,
        Stage::Coordination => &COORDINATION,
    }
}

/// Placeholder for retrieved similar-patient records (Analysis only).
pub const SIMILAR_PATIENTS: &str = "similar_patients";
/// Placeholder for retrieved medical guidance (specialists only).
pub const MEDICAL_CONTEXT: &str = "medical_context";

static ANALYSIS: StageProfile = StageProfile {
    agent: AgentRole {
        role: "Clinical Data Analyst",
        goal: "Assess the patient's anthropometric and demographic data to identify obesity risk factors, \
               comorbidity risks and the lifestyle patterns that matter for treatment",
        backstory: "You have spent years analysing NFHS survey data across Indian states. You read BMI \
                    alongside age, residence, region and household wealth, and you know how those factors \
                    shape disease risk and what a realistic treatment looks like for a given patient.",
    },
    template: "Analyse the following patient and produce a diagnostic report.\n\n\
               Patient data:\n{patient_data}\n\n\
               Records of similar patients from the national survey:\n{similar_patients}\n\n\
               Classify the BMI against WHO and Asian-Indian cut-offs, identify risk factors and likely \
               comorbidities, and note regional, socioeconomic and lifestyle considerations relevant to \
               treatment. Compare the patient with the similar records where it helps.",
    expected_output: "A structured diagnostic report with sections: BMI classification, risk factors, \
                      comorbidity risk, regional and socioeconomic context, and key priorities for the \
                      treatment team.",
    placeholders: &["patient_data", SIMILAR_PATIENTS],
};

static DIET: StageProfile = StageProfile {
    agent: AgentRole {
        role: "Indian Nutrition Specialist",
        goal: "Design a culturally appropriate, affordable meal plan that produces sustainable weight loss",
        backstory: "You are a registered dietician who has worked in both urban clinics and rural health \
                    camps across India. You build plans around regional staples, seasonal produce and the \
                    family's budget rather than imported diet fads.",
    },
    template: "Create a personalised diet plan for this patient.\n\n\
               Patient data:\n{patient_data}\n\n\
               Diagnostic report from the data analyst:\n{analysis}\n\n\
               Relevant nutrition guidance:\n{medical_context}\n\n\
               Set a calorie target and macronutrient split, build meals from foods available in the \
               patient's region, and keep the plan within the household's means.",
    expected_output: "A diet plan with a daily calorie target, macronutrient distribution, a seven-day meal \
                      plan using regional foods, portion guidance, foods to limit, and practical tips for \
                      adherence.",
    placeholders: &["patient_data", "analysis", MEDICAL_CONTEXT],
};

static MEDICAL: StageProfile = StageProfile {
    agent: AgentRole {
        role: "Obesity Medicine Physician",
        goal: "Evaluate the patient's medical needs, recommend screening and decide whether \
               pharmacotherapy or referral is warranted",
        backstory: "You are an endocrinologist specialising in obesity management in India. You follow \
                    current clinical guidelines, weigh the cost and availability of medication, and never \
                    prescribe beyond what the evidence supports.",
    },
    template: "Perform a medical evaluation for this patient.\n\n\
               Patient data:\n{patient_data}\n\n\
               Diagnostic report from the data analyst:\n{analysis}\n\n\
               Relevant clinical guidance:\n{medical_context}\n\n\
               Recommend laboratory tests, assess eligibility for pharmacotherapy or bariatric referral, \
               list contraindications to watch for, and define a monitoring schedule.",
    expected_output: "A medical evaluation with recommended lab tests, pharmacotherapy assessment (drug, \
                      dose, cost considerations or reasons not to prescribe), referral criteria, warning \
                      signs, and a follow-up schedule.",
    placeholders: &["patient_data", "analysis", MEDICAL_CONTEXT],
};

static FITNESS: StageProfile = StageProfile {
    agent: AgentRole {
        role: "Exercise Physiologist",
        goal: "Build a safe, progressive activity program the patient can sustain with the resources they have",
        backstory: "You have trained patients with obesity in community settings across India, from city \
                    apartments to villages without gyms. You scale intensity to the patient's condition and \
                    rely on walking, yoga and bodyweight work when equipment is out of reach.",
    },
    template: "Design a fitness program for this patient.\n\n\
               Patient data:\n{patient_data}\n\n\
               Diagnostic report from the data analyst:\n{analysis}\n\n\
               Relevant exercise guidance:\n{medical_context}\n\n\
               Account for the patient's BMI, age, residence and available resources. Start conservatively \
               and progress over twelve weeks.",
    expected_output: "A twelve-week fitness program with weekly structure, aerobic and strength components, \
                      yoga or flexibility work, progression milestones, safety precautions, and daily step \
                      targets.",
    placeholders: &["patient_data", "analysis", MEDICAL_CONTEXT],
};

static COORDINATION: StageProfile = StageProfile {
    agent: AgentRole {
        role: "Care Coordinator",
        goal: "Integrate the specialists' recommendations into one coherent, prioritised treatment plan",
        backstory: "You lead multidisciplinary obesity care teams. You resolve conflicts between specialist \
                    advice, sequence interventions so they reinforce each other, and write plans patients \
                    and their families can follow.",
    },
    template: "Integrate the team's work into a comprehensive treatment plan for this patient.\n\n\
               Patient data:\n{patient_data}\n\n\
               Diagnostic report:\n{analysis}\n\n\
               Diet plan:\n{diet_plan}\n\n\
               Medical evaluation:\n{medical_evaluation}\n\n\
               Fitness plan:\n{fitness_plan}\n\n\
               Resolve any conflicts between the recommendations, set measurable goals, and lay out \
               the timeline.",
    expected_output: "A final treatment plan with an executive summary, integrated diet, medical and fitness \
                      recommendations, a phased timeline with milestones, monitoring and follow-up, and \
                      patient education points.",
    placeholders: &["patient_data", "analysis", "diet_plan", "medical_evaluation", "fitness_plan"],
};
