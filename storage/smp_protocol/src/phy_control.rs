// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::trace_frame;
use smp_defs::PHY_CONTROL_REQUEST_LEN;
use smp_defs::PHY_CONTROL_RESPONSE_LEN;
use smp_defs::PhyOperation;
use smp_defs::SMP_FRAME_TYPE_REQUEST;
use smp_defs::SmpFunction;
use smp_transport::SmpExchange;
use smp_transport::SmpTransport;

/// Builds the PHY CONTROL request that disables `phy` or, with `disable`
/// false, hard resets it back into service.
pub(crate) fn phy_control_request(phy: u8, disable: bool) -> [u8; PHY_CONTROL_REQUEST_LEN] {
    let mut request = [0u8; PHY_CONTROL_REQUEST_LEN];
    request[0] = SMP_FRAME_TYPE_REQUEST;
    request[1] = SmpFunction::PHY_CONTROL.0;
    request[3] = 9;
    request[9] = phy;
    request[10] = if disable {
        PhyOperation::DISABLE.0
    } else {
        PhyOperation::HARD_RESET.0
    };
    request
}

/// Sends PHY CONTROL for `phy` to the current target.
///
/// The response is not checked; a failure to send is logged.
pub fn phy_control<T: SmpTransport + ?Sized>(transport: &mut T, phy: u8, disable: bool) {
    let request = phy_control_request(phy, disable);
    let mut response = [0u8; PHY_CONTROL_RESPONSE_LEN];
    trace_frame(if disable { "phy off" } else { "phy on" }, &request);

    let mut exchange = SmpExchange::new(&request, &mut response);
    match transport.send(&mut exchange) {
        Ok(()) => {
            tracing::debug!(
                phy,
                disable,
                transport_status = exchange.transport_status,
                "phy control sent"
            );
        }
        Err(err) => {
            tracing::warn!(
                phy,
                disable,
                error = &err as &dyn std::error::Error,
                "phy control request failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Reply;
    use crate::testing::ScriptedTransport;

    #[test]
    fn request_bytes() {
        let off = phy_control_request(17, true);
        assert_eq!(off.len(), 44);
        assert_eq!(&off[..4], &[0x40, 0x91, 0x00, 0x09]);
        assert_eq!(off[9], 17);
        assert_eq!(off[10], 3);
        assert_eq!(phy_control_request(17, false)[10], 2);
    }

    #[test]
    fn fire_and_forget() {
        let mut transport = ScriptedTransport::default();
        transport
            .replies
            .push_back(Ok(Reply::frame(vec![0x41, 0x91, 0, 0, 0, 0, 0, 0])));
        phy_control(&mut transport, 4, true);
        // the second send fails and is only logged
        phy_control(&mut transport, 4, false);
        assert_eq!(transport.requests.len(), 2);
        assert_eq!(transport.requests[1][10], 2);
    }
}
