use wifi_rsn::rsna::UpdateSink;

/// Authenticator-side key exchange, one per station. The indirection keeps
/// the association machinery testable with a mock exchange.
pub trait Authenticator: std::fmt::Debug {
    fn initiate(&mut self, update_sink: &mut UpdateSink) -> Result<(), failure::Error>;
    #[allow(dead_code)]
    fn reset(&mut self);
    fn on_eapol_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: &eapol::Frame,
    ) -> Result<(), failure::Error>;
    fn initiate_group_rekey(&mut self, update_sink: &mut UpdateSink)
        -> Result<(), failure::Error>;
}

impl Authenticator for wifi_rsn::Authenticator {
    fn initiate(&mut self, update_sink: &mut UpdateSink) -> Result<(), failure::Error> {
        wifi_rsn::Authenticator::initiate(self, update_sink)
    }

    fn reset(&mut self) {
        wifi_rsn::Authenticator::reset(self)
    }

    fn on_eapol_frame(
        &mut self,
        update_sink: &mut UpdateSink,
        frame: &eapol::Frame,
    ) -> Result<(), failure::Error> {
        wifi_rsn::Authenticator::on_eapol_frame(self, update_sink, frame)
    }

    fn initiate_group_rekey(
        &mut self,
        update_sink: &mut UpdateSink,
    ) -> Result<(), failure::Error> {
        wifi_rsn::Authenticator::initiate_group_rekey(self, update_sink)
    }
}
