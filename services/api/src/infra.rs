use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use unihaven::config::{MailBackend, MailConfig};
use unihaven::housing::{
    ConsoleMailer, InMemoryHousingStore, MailChannel, MailError, MailOutbox, OutboundMail,
    UniHavenService,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mail channel selected by `APP_MAIL_BACKEND`.
#[derive(Debug, Clone)]
pub(crate) enum MailTransport {
    Console(ConsoleMailer),
    Memory(MailOutbox),
}

impl MailTransport {
    pub(crate) fn from_backend(backend: MailBackend) -> Self {
        match backend {
            MailBackend::Console => Self::Console(ConsoleMailer),
            MailBackend::Memory => Self::Memory(MailOutbox::default()),
        }
    }

    pub(crate) fn outbox(&self) -> Option<&MailOutbox> {
        match self {
            Self::Memory(outbox) => Some(outbox),
            Self::Console(_) => None,
        }
    }
}

impl MailChannel for MailTransport {
    fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        match self {
            Self::Console(mailer) => mailer.send(mail),
            Self::Memory(outbox) => outbox.send(mail),
        }
    }
}

pub(crate) type ApiService = UniHavenService<InMemoryHousingStore, MailTransport>;

pub(crate) fn build_service(mail: &MailConfig) -> (Arc<ApiService>, Arc<MailTransport>) {
    let transport = Arc::new(MailTransport::from_backend(mail.backend));
    let service = UniHavenService::new(
        Arc::new(InMemoryHousingStore::new()),
        Arc::clone(&transport),
        mail.from_address.clone(),
    );
    (Arc::new(service), transport)
}
