//! Capture service operations: cards and card inputs

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::client::{expect_int, BackendClient};
use crate::models::{CaptureCard, CaptureCardListWrapper};

pub const CARD_TYPES: &[&str] = &[
    "QPSK", "QAM", "OFDM", "ATSC", "V4L", "MPEG", "FIREWIRE", "HDHOMERUN", "FREEBOX", "HDPVR",
    "DVB_S2", "IMPORT", "DEMO", "ASI", "CETON", "EXTERNAL", "VBOX", "DVB_T2", "V4L2ENC",
];

/// Card types that take the analog audio/picture settings.
const ANALOG_TYPES: &[&str] = &["V4L", "MPEG", "HDPVR", "V4L2ENC"];

/// Inputs for one new capture card.
#[derive(Debug, Clone)]
pub struct CaptureCardRequest {
    pub card_type: String,
    pub video_device: String,
    pub host_name: String,
    pub on_demand: bool,
    pub signal_timeout: i64,
    pub channel_timeout: i64,
    pub dvb_tuning_delay: i64,
    pub diseqc_id: Option<i64>,
    pub eit_scan: bool,
}

/// Inputs for one new card input.
#[derive(Debug, Clone)]
pub struct CardInputRequest {
    pub card_id: String,
    pub source_id: String,
    pub host_name: String,
    pub input_type: String,
    pub display_name: String,
    pub external_command: Option<String>,
    pub tune_chan: Option<String>,
    pub start_chan: Option<String>,
    pub rec_priority: i64,
    pub quick_tune: i64,
}

pub async fn get_capture_cards(client: &BackendClient) -> Result<Vec<CaptureCard>> {
    let resp = client
        .get("Capture/GetCaptureCardList", &[])
        .await
        .context("Get Capture Card List")?;
    let wrapper: CaptureCardListWrapper =
        serde_json::from_value(resp).context("malformed CaptureCardList response")?;
    Ok(wrapper.capture_card_list.capture_cards)
}

/// Flatten one card definition into AddCaptureCard postdata.
pub fn card_postdata(req: &CaptureCardRequest) -> Result<Vec<(String, String)>> {
    if !CARD_TYPES.contains(&req.card_type.as_str()) {
        bail!("unknown card type: {}", req.card_type);
    }

    let mut postdata: Vec<(String, String)> = vec![
        ("VideoDevice".into(), req.video_device.clone()),
        ("CardType".into(), req.card_type.clone()),
        ("DefaultInput".into(), "Television".into()),
        ("HostName".into(), req.host_name.clone()),
        ("SkipBTAudio".into(), "false".into()),
        ("DVBWaitForSeqStart".into(), "true".into()),
        ("DVBOnDemand".into(), req.on_demand.to_string()),
        ("SignalTimeout".into(), req.signal_timeout.to_string()),
        ("ChannelTimeout".into(), req.channel_timeout.to_string()),
        ("DVBTuningDelay".into(), req.dvb_tuning_delay.to_string()),
        ("DVBEITScan".into(), req.eit_scan.to_string()),
    ];
    if req.card_type == "FIREWIRE" {
        postdata.push(("FirewireModel".into(), String::new()));
        postdata.push(("FirewireSpeed".into(), String::new()));
        postdata.push(("FirewireConnection".into(), String::new()));
    }
    if ANALOG_TYPES.contains(&req.card_type.as_str()) {
        postdata.push(("AudioDevice".into(), String::new()));
        postdata.push(("VBIDevice".into(), String::new()));
        postdata.push(("AudioRateLimit".into(), "0".into()));
        postdata.push(("Contrast".into(), "0".into()));
        postdata.push(("Brightness".into(), "0".into()));
        postdata.push(("Colour".into(), "0".into()));
        postdata.push(("Hue".into(), "0".into()));
    }
    if let Some(diseqc_id) = req.diseqc_id {
        postdata.push(("DiSEqCId".into(), diseqc_id.to_string()));
    }
    Ok(postdata)
}

/// Create a capture card; returns its card id.
pub async fn add_capture_card(client: &BackendClient, req: &CaptureCardRequest) -> Result<i64> {
    let postdata = card_postdata(req)?;
    let resp = client
        .post("Capture/AddCaptureCard", &postdata)
        .await
        .with_context(|| format!("Unable to add card: {}", req.video_device))?;
    let cardid = expect_int(&resp)?;
    if cardid < 0 {
        bail!(
            "Backend failed to add: {:?} (CardId {cardid})",
            req.video_device
        );
    }
    info!("{cardid} added for card {:?}", req.video_device);
    Ok(cardid)
}

/// Refuse a duplicate DisplayName or a second input on a card.
pub fn check_input_conflicts(cards: &[CaptureCard], req: &CardInputRequest) -> Result<()> {
    for card in cards {
        match &card.display_name {
            Some(name) if *name == req.display_name => {
                bail!("input {:?} already exists", req.display_name);
            }
            Some(name) if card.card_id == req.card_id && !name.is_empty() => {
                bail!("CardId {} already has an input defined", req.card_id);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Flatten one input definition into AddCardInput postdata.
pub fn input_postdata(req: &CardInputRequest) -> Vec<(String, String)> {
    let mut postdata: Vec<(String, String)> = vec![
        ("CardId".into(), req.card_id.clone()),
        ("SourceId".into(), req.source_id.clone()),
        ("HostName".into(), req.host_name.clone()),
        ("InputName".into(), req.input_type.clone()),
        ("DisplayName".into(), req.display_name.clone()),
        ("ChangerDevice".into(), "Internal".into()),
        ("ChangerModel".into(), "Internal".into()),
        ("DishnetEIT".into(), "false".into()),
        ("RecPriority".into(), req.rec_priority.to_string()),
        ("Quicktune".into(), req.quick_tune.to_string()),
        ("SchedOrder".into(), "1".into()),
    ];
    if let Some(command) = &req.external_command {
        postdata.push(("ExternalCommand".into(), command.clone()));
    }
    if let Some(tune_chan) = &req.tune_chan {
        postdata.push(("TuneChan".into(), tune_chan.clone()));
    }
    if let Some(start_chan) = &req.start_chan {
        postdata.push(("StartChan".into(), start_chan.clone()));
    }
    postdata
}

/// Connect a card to a video source; returns the input id.
pub async fn add_card_input(client: &BackendClient, req: &CardInputRequest) -> Result<i64> {
    let cards = get_capture_cards(client).await?;
    check_input_conflicts(&cards, req)?;

    let postdata = input_postdata(req);
    let resp = client
        .post("Capture/AddCardInput", &postdata)
        .await
        .with_context(|| format!("Unable to add input: {}", req.input_type))?;
    let inputid = expect_int(&resp)?;
    if inputid < 0 {
        bail!(
            "Backend failed to add: {:?} (InputId {inputid})",
            req.display_name
        );
    }
    info!("{inputid} added for input {:?}", req.display_name);
    Ok(inputid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_request(card_type: &str) -> CaptureCardRequest {
        CaptureCardRequest {
            card_type: card_type.into(),
            video_device: "/dev/video1".into(),
            host_name: "mythbe".into(),
            on_demand: true,
            signal_timeout: 2000,
            channel_timeout: 20000,
            dvb_tuning_delay: 0,
            diseqc_id: None,
            eit_scan: false,
        }
    }

    fn lookup<'a>(postdata: &'a [(String, String)], key: &str) -> Option<&'a str> {
        postdata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_card_postdata_rejects_unknown_type() {
        assert!(card_postdata(&card_request("FOO")).is_err());
    }

    #[test]
    fn test_card_postdata_external() {
        let postdata = card_postdata(&card_request("EXTERNAL")).unwrap();
        assert_eq!(lookup(&postdata, "CardType"), Some("EXTERNAL"));
        assert_eq!(lookup(&postdata, "DefaultInput"), Some("Television"));
        assert_eq!(lookup(&postdata, "SignalTimeout"), Some("2000"));
        assert!(lookup(&postdata, "AudioDevice").is_none());
        assert!(lookup(&postdata, "FirewireModel").is_none());
    }

    #[test]
    fn test_card_postdata_analog_and_firewire_extras() {
        let analog = card_postdata(&card_request("HDPVR")).unwrap();
        assert_eq!(lookup(&analog, "AudioDevice"), Some(""));
        assert_eq!(lookup(&analog, "Hue"), Some("0"));

        let firewire = card_postdata(&card_request("FIREWIRE")).unwrap();
        assert_eq!(lookup(&firewire, "FirewireSpeed"), Some(""));
    }

    fn input_request() -> CardInputRequest {
        CardInputRequest {
            card_id: "27".into(),
            source_id: "8".into(),
            host_name: "mythbe".into(),
            input_type: "MPEG2TS".into(),
            display_name: "Twitch".into(),
            external_command: None,
            tune_chan: None,
            start_chan: None,
            rec_priority: 0,
            quick_tune: 2,
        }
    }

    #[test]
    fn test_input_conflicts() {
        let cards = vec![
            CaptureCard {
                card_id: "26".into(),
                display_name: Some("OTA".into()),
                ..Default::default()
            },
            CaptureCard {
                card_id: "27".into(),
                display_name: Some("Existing".into()),
                ..Default::default()
            },
        ];

        let mut req = input_request();
        assert!(check_input_conflicts(&cards, &req).is_err());

        req.card_id = "28".into();
        assert!(check_input_conflicts(&cards, &req).is_ok());

        req.display_name = "OTA".into();
        assert!(check_input_conflicts(&cards, &req).is_err());
    }

    #[test]
    fn test_input_postdata_optionals() {
        let mut req = input_request();
        let postdata = input_postdata(&req);
        assert_eq!(lookup(&postdata, "ChangerDevice"), Some("Internal"));
        assert_eq!(lookup(&postdata, "SchedOrder"), Some("1"));
        assert!(lookup(&postdata, "TuneChan").is_none());

        req.tune_chan = Some("3".into());
        req.external_command = Some("/usr/local/bin/change".into());
        let postdata = input_postdata(&req);
        assert_eq!(lookup(&postdata, "TuneChan"), Some("3"));
        assert_eq!(
            lookup(&postdata, "ExternalCommand"),
            Some("/usr/local/bin/change")
        );
    }
}
