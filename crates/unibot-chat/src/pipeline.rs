//! One conversation turn: classify, dispatch, synthesize.
//!
//! `process` never fails: an error or panic inside a branch becomes the
//! generic error reply.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use unibot_core::directory::StudentDirectory;
use unibot_core::error::UnibotError;
use unibot_core::types::DEFAULT_SALUTATION;
use unibot_vector::knowledge::KnowledgeEngine;

use crate::error::ChatError;
use crate::router::{Intent, MessageRouter};
use crate::synthesizer::{RecordKind, ResponseSynthesizer};
use crate::types::{ContextMessage, ConversationResult};

/// Context messages prepended to a general FAQ question.
pub const CONTEXT_WINDOW: usize = 3;

/// Build the FAQ query for a general question, prefixed with the tail of the
/// conversation when there is one.
pub fn with_context(question: &str, recent_context: &[ContextMessage]) -> String {
    if recent_context.is_empty() {
        return question.to_string();
    }
    let start = recent_context.len().saturating_sub(CONTEXT_WINDOW);
    let lines: Vec<String> = recent_context[start..]
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.message))
        .collect();
    format!(
        "Context:\n{}\n\nCurrent question: {}",
        lines.join("\n"),
        question
    )
}

/// Routes a message and produces its reply.
///
/// Shared across bot workers behind an `Arc`; every collaborator is itself
/// `Send + Sync`.
pub struct ConversationPipeline {
    router: MessageRouter,
    synthesizer: ResponseSynthesizer,
    knowledge: Arc<KnowledgeEngine>,
    directory: Arc<dyn StudentDirectory>,
}

impl std::fmt::Debug for ConversationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationPipeline")
            .field("router", &self.router)
            .field("knowledge", &self.knowledge)
            .finish_non_exhaustive()
    }
}

impl ConversationPipeline {
    pub fn new(
        router: MessageRouter,
        synthesizer: ResponseSynthesizer,
        knowledge: Arc<KnowledgeEngine>,
        directory: Arc<dyn StudentDirectory>,
    ) -> Self {
        Self {
            router,
            synthesizer,
            knowledge,
            directory,
        }
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeEngine> {
        &self.knowledge
    }

    /// Answer one message.
    ///
    /// `contact_id` is the student's application number; record lookups use
    /// it directly. A blank salutation is replaced with the default.
    pub async fn process(
        &self,
        message: &str,
        contact_id: &str,
        contact_name: &str,
        salutation: &str,
        recent_context: &[ContextMessage],
    ) -> ConversationResult {
        let salutation = match salutation.trim() {
            "" => DEFAULT_SALUTATION,
            s => s,
        };

        let turn = self.dispatch(message.trim(), contact_id, salutation, recent_context);
        match AssertUnwindSafe(turn).catch_unwind().await {
            Ok(Ok(result)) => {
                debug!(
                    contact = contact_name,
                    message_type = %result.message_type,
                    confidence = result.confidence,
                    "Turn processed"
                );
                result
            }
            Ok(Err(e)) => {
                warn!(contact = contact_name, error = %e, "Turn failed");
                self.synthesizer.error_result(salutation)
            }
            Err(_) => {
                error!(contact = contact_name, "Turn panicked");
                self.synthesizer.error_result(salutation)
            }
        }
    }

    async fn dispatch(
        &self,
        message: &str,
        contact_id: &str,
        salutation: &str,
        recent_context: &[ContextMessage],
    ) -> Result<ConversationResult, ChatError> {
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let route = self.router.route(message);
        debug!(intent = ?route.intent, "Message routed");

        let result = match route.intent {
            Intent::Greeting => self.synthesizer.greeting(salutation),
            Intent::Acknowledgment => self.synthesizer.acknowledgment(salutation),
            Intent::PayPal => self.synthesizer.paypal(salutation),
            Intent::Publication => {
                let faq = self.knowledge.query(&route.question, salutation, None).await;
                self.synthesizer.publication(salutation, &faq)
            }
            Intent::Remittance => self.synthesizer.remittance(salutation),
            Intent::Fees => {
                let invoices = found(
                    self.directory.lookup_invoices(contact_id).await,
                    "invoices",
                );
                match invoices {
                    Some(set) => {
                        self.synthesizer
                            .invoice_response(&route.question, salutation, &set)
                            .await
                    }
                    None => {
                        let faq = self.knowledge.query(&route.question, salutation, None).await;
                        self.synthesizer
                            .record_fallback(RecordKind::Invoice, salutation, faq)
                    }
                }
            }
            Intent::Academic => {
                let academic = found(
                    self.directory.lookup_academic(contact_id).await,
                    "academic records",
                );
                match academic {
                    Some(set) => {
                        self.synthesizer
                            .academic_response(&route.question, salutation, &set)
                            .await
                    }
                    None => {
                        let faq = self.knowledge.query(&route.question, salutation, None).await;
                        self.synthesizer
                            .record_fallback(RecordKind::Academic, salutation, faq)
                    }
                }
            }
            Intent::StudentFaq => {
                let faq = self.knowledge.query(&route.question, salutation, None).await;
                self.synthesizer.faq_result(faq)
            }
            Intent::GeneralFaq => {
                let query = with_context(&route.question, recent_context);
                let faq = self.knowledge.query(&query, salutation, None).await;
                self.synthesizer.faq_result(faq)
            }
        };
        Ok(result)
    }
}

/// A failed lookup counts as "no record".
fn found<T>(lookup: Result<Option<T>, UnibotError>, what: &str) -> Option<T> {
    match lookup {
        Ok(record) => record,
        Err(e) => {
            let e = ChatError::from(e);
            warn!(error = %e, "Failed to look up {}; treating as absent", what);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use unibot_core::directory::MemoryDirectory;
    use unibot_core::generation::{FailingGenerator, MockGenerator, TextGenerator};
    use unibot_core::types::{
        AcademicSet, ConversationTurnRecord, Course, HistoryEntry, Invoice, InvoiceSet,
        StudentProfile,
    };
    use unibot_vector::embedding::MockEmbedding;
    use unibot_vector::knowledge::{KnowledgeRow, RetrievalSettings};

    use crate::synthesizer::{ACADEMIC_SOURCE, INVOICE_SOURCE};
    use crate::types::{Category, MessageType};

    const APP: &str = "APP-2024-001";

    struct Fixture {
        pipeline: ConversationPipeline,
        directory: Arc<MemoryDirectory>,
        generator: Arc<MockGenerator>,
    }

    fn refund_row() -> KnowledgeRow {
        KnowledgeRow::new(
            "What is the refund policy?",
            "Refunds are processed within thirty days of a written request to finance.",
            "finance",
            "general",
        )
    }

    fn journal_row() -> KnowledgeRow {
        KnowledgeRow::new(
            "How do I publish in the journal?",
            "Send the manuscript to the editorial office.",
            "publication",
            "general",
        )
    }

    fn fee_row() -> KnowledgeRow {
        KnowledgeRow::new(
            "What is my fee balance?",
            "Fee balances are listed under Finance in the CMS portal.",
            "fees",
            "CMS",
        )
    }

    async fn fixture_with(
        rows: &[KnowledgeRow],
        generator: Arc<MockGenerator>,
        record_generator: Arc<dyn TextGenerator>,
    ) -> Fixture {
        let knowledge = Arc::new(KnowledgeEngine::new(
            Arc::new(MockEmbedding::new()),
            generator.clone(),
            RetrievalSettings::default(),
        ));
        if !rows.is_empty() {
            knowledge.ingest(rows).await.unwrap();
        }
        let directory = Arc::new(MemoryDirectory::new());
        let pipeline = ConversationPipeline::new(
            MessageRouter::default(),
            ResponseSynthesizer::new(record_generator),
            knowledge,
            directory.clone(),
        );
        Fixture {
            pipeline,
            directory,
            generator,
        }
    }

    async fn fixture(rows: &[KnowledgeRow]) -> Fixture {
        let generator = Arc::new(MockGenerator::with_reply("Generated answer."));
        fixture_with(rows, generator.clone(), generator).await
    }

    /// Four copies of a row so an exact query fills the whole top-k.
    fn four(row: KnowledgeRow) -> Vec<KnowledgeRow> {
        vec![row; 4]
    }

    fn invoice_set() -> InvoiceSet {
        InvoiceSet::from_invoices(vec![Invoice {
            invoice_number: "INV-9".to_string(),
            invoice_date: "2024-05-01".to_string(),
            total_amount: 1200.0,
            paid_amount: 200.0,
            balance_amount: 1000.0,
            due_date: "2024-06-01".to_string(),
            status: "Open".to_string(),
            payment_method: "Bank".to_string(),
        }])
        .unwrap()
    }

    fn academic_set() -> AcademicSet {
        AcademicSet::from_courses(vec![Course {
            course_name: "Biostatistics".to_string(),
            course_code: "PH510".to_string(),
            enrollment_date: "2024-02-01".to_string(),
            status: "Completed".to_string(),
            grade: Some("A".to_string()),
            credits: Some(3.0),
            mentor: None,
        }])
        .unwrap()
    }

    async fn ask(f: &Fixture, message: &str) -> ConversationResult {
        f.pipeline.process(message, APP, "Jamie", "Dr. Rivera", &[]).await
    }

    // ---- Small talk and fixed routes ----

    #[tokio::test]
    async fn test_hi_is_greeting() {
        let f = fixture(&[]).await;
        let r = ask(&f, "hi").await;
        assert_eq!(r.message_type, MessageType::Greeting);
        assert_eq!(r.confidence, 1.0);
        assert!(r.response.contains("Dr. Rivera"));
        assert_eq!(f.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_thanks_is_acknowledgment() {
        let f = fixture(&[]).await;
        let r = ask(&f, "thanks").await;
        assert_eq!(r.message_type, MessageType::Acknowledgment);
        assert_eq!(r.category, Category::PostInteraction);
    }

    #[tokio::test]
    async fn test_paypal_beats_publication() {
        let f = fixture(&[]).await;
        let r = ask(&f, "can I pay through paypal for my journal article").await;
        assert_eq!(r.message_type, MessageType::PaypalQuery);
        assert!(r.requires_followup);
    }

    #[tokio::test]
    async fn test_remittance() {
        let f = fixture(&[]).await;
        let r = ask(&f, "attached is the payment receipt for this month").await;
        assert_eq!(r.message_type, MessageType::RemittanceConfirmation);
        assert_eq!(r.category, Category::Finance);
    }

    #[tokio::test]
    async fn test_publication_appends_confident_faq() {
        let row = journal_row();
        let f = fixture(&four(row.clone())).await;
        let r = ask(&f, &row.document()).await;
        assert_eq!(r.message_type, MessageType::PublicationQuery);
        assert!(r.response.ends_with("\n\nGenerated answer."));
        assert_eq!(r.sources, vec!["How do I publish in the journal?"]);
        assert_eq!(r.confidence, 1.0);
    }

    // ---- Student records ----

    #[tokio::test]
    async fn test_fee_balance_with_invoices() {
        let f = fixture(&[]).await;
        f.directory.insert_invoices(APP, invoice_set());
        let r = ask(&f, "what is my fee balance").await;
        assert_eq!(r.message_type, MessageType::InvoiceResponse);
        assert_eq!(r.category, Category::Fees);
        assert_eq!(r.sources, vec![INVOICE_SOURCE]);
        assert_eq!(r.confidence, 1.0);

        let prompt = &f.generator.prompts()[0];
        assert!(prompt.contains("Student asked: what is my fee balance"));
        assert!(prompt.contains("INV-9"));
    }

    #[tokio::test]
    async fn test_fees_without_record_uses_faq() {
        let row = fee_row();
        let f = fixture(&four(row.clone())).await;
        let r = ask(&f, &format!("my fee {}", row.document())).await;
        assert_eq!(r.message_type, MessageType::FeesGeneral);
        assert_eq!(r.category, Category::Fees);
        assert!(r.confidence >= 0.65);
    }

    #[tokio::test]
    async fn test_fees_without_record_or_faq_is_not_found() {
        let f = fixture(&[refund_row()]).await;
        let r = ask(&f, "what is my fee balance").await;
        assert_eq!(r.message_type, MessageType::DataNotFound);
        assert_eq!(r.confidence, 0.0);
        assert!(r.sources.is_empty());
        assert!(r.response.contains("couldn't find invoice details"));
    }

    #[tokio::test]
    async fn test_academic_with_record() {
        let f = fixture(&[]).await;
        f.directory.insert_academic(APP, academic_set());
        let r = ask(&f, "Hello sir, what is my course status").await;
        assert_eq!(r.message_type, MessageType::AcademicResponse);
        assert_eq!(r.sources, vec![ACADEMIC_SOURCE]);
        assert!(f.generator.prompts()[0].contains("Student asked: what is my course status"));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_treated_as_absent() {
        let f = fixture(&[refund_row()]).await;
        f.directory.insert_invoices(APP, invoice_set());
        f.directory.set_fail_lookups(true);
        let r = ask(&f, "what is my fee balance").await;
        assert_eq!(r.message_type, MessageType::DataNotFound);
    }

    #[tokio::test]
    async fn test_record_formatting_failure_keeps_full_confidence() {
        let generator = Arc::new(MockGenerator::new());
        let f = fixture_with(&[], generator, Arc::new(FailingGenerator)).await;
        f.directory.insert_invoices(APP, invoice_set());
        let r = ask(&f, "what is my fee balance").await;
        assert_eq!(r.message_type, MessageType::InvoiceResponse);
        assert_eq!(r.confidence, 1.0);
        assert!(r.response.contains("1000.00"));
    }

    // ---- FAQ ----

    #[tokio::test]
    async fn test_refund_policy_miss_is_low_confidence() {
        let f = fixture(&[refund_row()]).await;
        let r = ask(&f, "what is the refund policy").await;
        assert_eq!(r.message_type, MessageType::LowConfidenceAnswer);
        assert_eq!(r.confidence, 0.0);
        assert!(r.response.starts_with("Dr. Rivera, I couldn't find specific information"));
        assert!(r
            .response
            .ends_with("please provide more details or contact support."));
    }

    #[tokio::test]
    async fn test_exact_faq_hit_is_high_confidence() {
        let row = refund_row();
        let f = fixture(&four(row.clone())).await;
        let r = ask(&f, &row.document()).await;
        assert_eq!(r.message_type, MessageType::FaqAnswerHighConfidence);
        assert!((r.confidence - 0.9).abs() < 1e-9);
        assert_eq!(r.sources, vec!["What is the refund policy?"]);
        assert_eq!(r.response, "Generated answer.");
    }

    #[tokio::test]
    async fn test_general_faq_prepends_last_three_context_messages() {
        let f = fixture(&[refund_row()]).await;
        let context = vec![
            ContextMessage::new("Student", "first"),
            ContextMessage::new("Bot", "second"),
            ContextMessage::new("Student", "third"),
            ContextMessage::new("Bot", "fourth"),
        ];
        let query = with_context("and the deadline", &context);
        assert_eq!(
            query,
            "Context:\nBot: second\nStudent: third\nBot: fourth\n\nCurrent question: and the deadline"
        );

        let r = f
            .pipeline
            .process("and the deadline", APP, "Jamie", "Student", &context)
            .await;
        assert_eq!(r.category, Category::General);
    }

    #[test]
    fn test_with_context_empty_is_question() {
        assert_eq!(with_context("q", &[]), "q");
    }

    #[tokio::test]
    async fn test_empty_index_reports_difficulties() {
        let f = fixture(&[]).await;
        let r = ask(&f, "where is the library").await;
        assert_eq!(r.message_type, MessageType::LowConfidenceAnswer);
        assert!(r.response.starts_with("I'm having technical difficulties."));
    }

    // ---- Failures ----

    #[tokio::test]
    async fn test_empty_message_is_error_result() {
        let f = fixture(&[]).await;
        let r = f.pipeline.process("   ", APP, "Jamie", "", &[]).await;
        assert_eq!(r.message_type, MessageType::Error);
        assert_eq!(r.response, "Student, I encountered an error. Please try again.");
        assert_eq!(r.confidence, 0.0);
    }

    struct PanickingDirectory;

    #[async_trait]
    impl StudentDirectory for PanickingDirectory {
        async fn lookup_profile(&self, _: &str, name: &str) -> unibot_core::Result<StudentProfile> {
            Ok(StudentProfile::unknown(name))
        }
        async fn lookup_invoices(&self, _: &str) -> unibot_core::Result<Option<InvoiceSet>> {
            panic!("directory exploded");
        }
        async fn lookup_academic(&self, _: &str) -> unibot_core::Result<Option<AcademicSet>> {
            Ok(None)
        }
        async fn append_conversation_turn(
            &self,
            _: &ConversationTurnRecord,
        ) -> unibot_core::Result<()> {
            Ok(())
        }
        async fn conversation_history(
            &self,
            _: &str,
            _: usize,
        ) -> unibot_core::Result<Vec<HistoryEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_panic_in_branch_becomes_error_result() {
        let generator = Arc::new(MockGenerator::new());
        let pipeline = ConversationPipeline::new(
            MessageRouter::default(),
            ResponseSynthesizer::new(generator.clone()),
            Arc::new(KnowledgeEngine::new(
                Arc::new(MockEmbedding::new()),
                generator,
                RetrievalSettings::default(),
            )),
            Arc::new(PanickingDirectory),
        );
        let r = pipeline
            .process("what is my fee balance", APP, "Jamie", "Mx. Lee", &[])
            .await;
        assert_eq!(r.message_type, MessageType::Error);
        assert_eq!(r.category, Category::Error);
        assert!(r.response.starts_with("Mx. Lee, I encountered an error."));

        // The pipeline is still usable afterwards.
        let r = pipeline.process("hi", APP, "Jamie", "Mx. Lee", &[]).await;
        assert_eq!(r.message_type, MessageType::Greeting);
    }

    #[tokio::test]
    async fn test_concurrent_turns_share_pipeline() {
        let row = refund_row();
        let f = Arc::new(fixture(&four(row.clone())).await);
        let mut handles = Vec::new();
        for i in 0..8 {
            let f = Arc::clone(&f);
            let message = if i % 2 == 0 { "hi".to_string() } else { row.document() };
            handles.push(tokio::spawn(async move { ask(&f, &message).await }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let r = handle.await.unwrap();
            let expected = if i % 2 == 0 {
                MessageType::Greeting
            } else {
                MessageType::FaqAnswerHighConfidence
            };
            assert_eq!(r.message_type, expected);
        }
    }
}
